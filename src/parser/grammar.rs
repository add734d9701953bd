//! Error-tolerant recursive-descent parser for proto2, proto3 and editions files

use tracing::debug;

use crate::parser::ast::{
    FieldRange, Ident, ImportKind, Label, MAX_FIELD_NUMBER, NodeKind, OptionName, Span,
    SyntaxError, SyntaxNode, TypeName, parse_int, unquote,
};
use crate::parser::lexer::{Lexeme, Token, tokenize};

/// Keywords that start a declaration. When one of these begins a line at or left of the
/// column of an open block's declaration, the block is assumed to be missing its `}`.
const DECLARATION_KEYWORDS: [&str; 11] = [
    "syntax", "edition", "package", "import", "option", "message", "enum", "service", "extend",
    "oneof", "rpc",
];

/// Result of parsing one file. Parsing never fails; problems end up in `errors`.
#[derive(Debug, Clone)]
pub struct Parse {
    pub root: SyntaxNode,
    pub errors: Vec<SyntaxError>,
}

/// Parse proto source text into a syntax tree.
pub fn parse(text: &str) -> Parse {
    let lexed = tokenize(text);
    let mut parser = Parser {
        text,
        tokens: lexed.tokens,
        comments: lexed.comments,
        pos: 0,
        errors: Vec::new(),
    };
    let root = parser.file();

    let mut errors = lexed.errors;
    errors.append(&mut parser.errors);
    errors.sort_by_key(|e| e.span.start);
    debug!("Parsed {} bytes with {} syntax errors", text.len(), errors.len());

    Parse { root, errors }
}

/// Item parser used inside a `{ ... }` block.
type ItemFn<'a> = fn(&mut Parser<'a>) -> SyntaxNode;

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Lexeme>,
    comments: Vec<Span>,
    pos: usize,
    errors: Vec<SyntaxError>,
}

impl<'a> Parser<'a> {
    // ---- token cursor ----

    fn peek(&self) -> Option<&Lexeme> {
        self.tokens.get(self.pos)
    }

    fn nth_kind(&self, n: usize) -> Option<Token> {
        self.tokens.get(self.pos + n).map(|t| t.kind)
    }

    fn at(&self, kind: Token) -> bool {
        self.nth_kind(0) == Some(kind)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.peek()
            .is_some_and(|t| t.kind == Token::Ident && &self.text[t.span.clone()] == keyword)
    }

    fn bump(&mut self) -> Option<Lexeme> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: Token) -> Option<Lexeme> {
        if self.at(kind) { self.bump() } else { None }
    }

    fn expect(&mut self, kind: Token) -> Option<Lexeme> {
        let token = self.eat(kind);
        if token.is_none() {
            self.error_here(format!("expected {}", kind.describe()));
        }
        token
    }

    fn slice(&self, span: &Span) -> &'a str {
        &self.text[span.clone()]
    }

    /// Start offset of the current token, or end of input.
    fn current_start(&self) -> usize {
        self.peek().map_or(self.text.len(), |t| t.span.start)
    }

    /// End offset of the last consumed token.
    fn last_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.span.end)
    }

    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.errors.push(SyntaxError {
            message: message.into(),
            span,
        });
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let message = message.into();
        let (message, span) = match self.peek() {
            Some(token) => (
                format!("{message}, found {}", token.kind.describe()),
                token.span.clone(),
            ),
            None => (
                format!("{message}, found end of file"),
                self.text.len()..self.text.len(),
            ),
        };
        self.error(message, span);
    }

    // ---- layout helpers ----

    fn line_start(&self, offset: usize) -> usize {
        self.text[..offset].rfind('\n').map_or(0, |i| i + 1)
    }

    fn column(&self, offset: usize) -> usize {
        offset - self.line_start(offset)
    }

    fn starts_line(&self, offset: usize) -> bool {
        self.text[self.line_start(offset)..offset].trim().is_empty()
    }

    fn is_line_start_declaration(&self, token: &Lexeme) -> bool {
        token.kind == Token::Ident
            && DECLARATION_KEYWORDS.contains(&self.slice(&token.span))
            && self.starts_line(token.span.start)
    }

    /// Comments ending right before `start`, without blank lines in between and not
    /// trailing code on their own line.
    fn leading_comments(&self, start: usize) -> Vec<String> {
        let upto = self.comments.partition_point(|c| c.end <= start);
        let mut boundary = start;
        let mut out = Vec::new();
        for span in self.comments[..upto].iter().rev() {
            let gap = &self.text[span.end..boundary];
            if !gap.trim().is_empty() || gap.matches('\n').count() > 1 {
                break;
            }
            if !self.starts_line(span.start) {
                break;
            }
            out.push(self.slice(span).to_string());
            boundary = span.start;
        }
        out.reverse();
        out
    }

    fn node(&self, kind: NodeKind, start: usize) -> SyntaxNode {
        let mut node = SyntaxNode::new(kind, start..self.last_end().max(start));
        node.comments = self.leading_comments(start);
        node
    }

    // ---- recovery ----

    /// Skip input after a failed item that started at token index `item_pos`.
    ///
    /// Stops after a `;`, after a balanced `{ ... }`, before a `}`, or before a
    /// declaration keyword that starts a line. Always makes progress unless the
    /// current token is `}` or end of input.
    fn recover(&mut self, item_pos: usize, start: usize) -> SyntaxNode {
        while let Some(token) = self.peek().cloned() {
            match token.kind {
                Token::Semi => {
                    self.bump();
                    break;
                }
                Token::RBrace => break,
                Token::LBrace => {
                    self.skip_balanced();
                    break;
                }
                _ if self.pos > item_pos && self.is_line_start_declaration(&token) => break,
                _ => {
                    self.bump();
                }
            }
        }
        SyntaxNode::new(NodeKind::Error, start..self.last_end().max(start))
    }

    /// Skip a `{ ... }` group including nested groups. Expects to be at `{`.
    fn skip_balanced(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.bump() {
            match token.kind {
                Token::LBrace => depth += 1,
                Token::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn fail(&mut self, message: &str, item_pos: usize, start: usize) -> SyntaxNode {
        self.error_here(message);
        self.recover(item_pos, start)
    }

    // ---- blocks ----

    /// Parse `{ item* }`. `opener` is the offset of the declaration keyword that owns
    /// the block.
    fn block(&mut self, opener: usize, item: ItemFn<'a>) -> Vec<SyntaxNode> {
        let mut children = Vec::new();
        if self.expect(Token::LBrace).is_none() {
            return children;
        }
        let opener_column = self.column(opener);
        // unindented nested declarations are fine as long as the braces balance
        let unclosed = !self.block_is_closed();

        loop {
            let Some(token) = self.peek().cloned() else {
                self.error("expected '}' to close this block", opener..opener);
                break;
            };
            match token.kind {
                Token::RBrace => {
                    self.bump();
                    break;
                }
                Token::Semi => {
                    self.bump();
                }
                _ if unclosed
                    && self.is_line_start_declaration(&token)
                    && self.column(token.span.start) <= opener_column =>
                {
                    self.error("expected '}' to close this block", opener..opener);
                    break;
                }
                _ => children.push(item(self)),
            }
        }
        children
    }

    /// Whether the `{` just consumed has a matching `}` somewhere after it.
    fn block_is_closed(&self) -> bool {
        let mut depth = 1usize;
        for token in &self.tokens[self.pos..] {
            match token.kind {
                Token::LBrace => depth += 1,
                Token::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }

    // ---- terminals ----

    fn ident(&mut self) -> Option<Ident> {
        let token = self.eat(Token::Ident)?;
        Some(Ident {
            text: self.slice(&token.span).to_string(),
            span: token.span,
        })
    }

    fn type_name(&mut self) -> Option<TypeName> {
        let start = self.current_start();
        let absolute = self.at(Token::Dot) && self.nth_kind(1) == Some(Token::Ident);
        if absolute {
            self.bump();
        }
        let mut segments = vec![self.ident()?];
        while self.at(Token::Dot) && self.nth_kind(1) == Some(Token::Ident) {
            self.bump();
            segments.push(self.ident()?);
        }

        let joined = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(".");
        let text = if absolute { format!(".{joined}") } else { joined };
        Some(TypeName {
            text,
            span: start..self.last_end(),
            absolute,
            segments,
        })
    }

    fn int(&mut self) -> Option<i64> {
        let negative = self.eat(Token::Minus).is_some();
        let token = self.eat(Token::Int)?;
        let value = parse_int(self.slice(&token.span))?;
        Some(if negative { -value } else { value })
    }

    /// Constant value of an option: scalar, string (with implicit concatenation), or an
    /// aggregate `{ ... }` block. Returns the source text of the value.
    fn constant(&mut self) -> Option<String> {
        let start = self.current_start();
        match self.nth_kind(0)? {
            Token::LBrace => self.skip_balanced(),
            Token::Minus | Token::Plus => {
                self.bump();
                if self.eat(Token::Int).is_none()
                    && self.eat(Token::Float).is_none()
                    && self.eat(Token::Ident).is_none()
                {
                    return None;
                }
            }
            Token::Str => {
                while self.eat(Token::Str).is_some() {}
            }
            Token::Int | Token::Float => {
                self.bump();
            }
            Token::Ident => {
                self.type_name()?;
            }
            _ => return None,
        }
        Some(self.text[start..self.last_end()].to_string())
    }

    // ---- file level ----

    fn file(&mut self) -> SyntaxNode {
        let mut root = SyntaxNode::new(NodeKind::File, 0..self.text.len());
        while let Some(token) = self.peek().cloned() {
            match token.kind {
                Token::Semi => {
                    self.bump();
                }
                Token::RBrace => {
                    self.error("unexpected '}'", token.span.clone());
                    self.bump();
                    root.children
                        .push(SyntaxNode::new(NodeKind::Error, token.span.clone()));
                }
                _ => {
                    let node = self.top_level_item();
                    root.children.push(node);
                }
            }
        }
        root
    }

    fn top_level_item(&mut self) -> SyntaxNode {
        let item_pos = self.pos;
        let start = self.current_start();
        let keyword = self.peek().map(|t| self.slice(&t.span)).unwrap_or_default();
        match keyword {
            "syntax" | "edition" => self.syntax(),
            "package" => self.package(),
            "import" => self.import(),
            "option" => self.option_statement(),
            "message" => self.message(),
            "enum" => self.enumeration(),
            "service" => self.service(),
            "extend" => self.extend(),
            _ => self.fail("expected a top-level declaration", item_pos, start),
        }
    }

    fn syntax(&mut self) -> SyntaxNode {
        let item_pos = self.pos;
        let start = self.current_start();
        let edition = self.at_keyword("edition");
        self.bump();
        if self.expect(Token::Eq).is_none() {
            return self.recover(item_pos, start);
        }
        let Some(value) = self.eat(Token::Str) else {
            return self.fail("expected a string literal", item_pos, start);
        };
        let value = unquote(self.slice(&value.span)).to_string();
        self.expect(Token::Semi);
        self.node(NodeKind::Syntax { value, edition }, start)
    }

    fn package(&mut self) -> SyntaxNode {
        let item_pos = self.pos;
        let start = self.current_start();
        self.bump();
        let Some(name) = self.type_name() else {
            return self.fail("expected a package name", item_pos, start);
        };
        self.expect(Token::Semi);
        self.node(NodeKind::Package { name }, start)
    }

    fn import(&mut self) -> SyntaxNode {
        let item_pos = self.pos;
        let start = self.current_start();
        self.bump();
        let kind = if self.at_keyword("public") {
            self.bump();
            ImportKind::Public
        } else if self.at_keyword("weak") {
            self.bump();
            ImportKind::Weak
        } else {
            ImportKind::Default
        };
        let Some(path) = self.eat(Token::Str) else {
            return self.fail("expected an import path string", item_pos, start);
        };
        let path_text = unquote(self.slice(&path.span)).to_string();
        self.expect(Token::Semi);
        self.node(
            NodeKind::Import {
                path: path_text,
                path_span: path.span,
                kind,
            },
            start,
        )
    }

    fn option_name(&mut self) -> Option<OptionName> {
        let start = self.current_start();
        let mut extension = None;
        loop {
            if self.eat(Token::LParen).is_some() {
                let name = self.type_name()?;
                self.eat(Token::RParen)?;
                extension.get_or_insert(name);
            } else {
                self.ident()?;
            }
            if !self.at(Token::Dot) {
                break;
            }
            self.bump();
        }
        Some(OptionName {
            text: self.text[start..self.last_end()].to_string(),
            span: start..self.last_end(),
            extension,
        })
    }

    /// `option name = value;`
    fn option_statement(&mut self) -> SyntaxNode {
        let item_pos = self.pos;
        let start = self.current_start();
        self.bump();
        let Some(name) = self.option_name() else {
            return self.fail("expected an option name", item_pos, start);
        };
        if self.expect(Token::Eq).is_none() {
            return self.recover(item_pos, start);
        }
        let Some(value) = self.constant() else {
            return self.fail("expected an option value", item_pos, start);
        };
        self.expect(Token::Semi);
        self.node(NodeKind::Option { name, value }, start)
    }

    /// `[name = value, ...]` after fields and enum values.
    fn compact_options(&mut self) -> Vec<SyntaxNode> {
        let mut options = Vec::new();
        if self.eat(Token::LBracket).is_none() {
            return options;
        }
        loop {
            let start = self.current_start();
            let Some(name) = self.option_name() else {
                self.error_here("expected an option name");
                break;
            };
            if self.expect(Token::Eq).is_none() {
                break;
            }
            let Some(value) = self.constant() else {
                self.error_here("expected an option value");
                break;
            };
            options.push(SyntaxNode::new(
                NodeKind::Option { name, value },
                start..self.last_end(),
            ));
            if self.eat(Token::Comma).is_none() {
                break;
            }
        }
        while !self.at(Token::RBracket) && !self.at(Token::Semi) && self.peek().is_some() {
            self.bump();
        }
        self.expect(Token::RBracket);
        options
    }

    // ---- messages ----

    fn message(&mut self) -> SyntaxNode {
        let item_pos = self.pos;
        let start = self.current_start();
        self.bump();
        let Some(name) = self.ident() else {
            return self.fail("expected a message name", item_pos, start);
        };
        let children = self.block(start, Parser::message_item);
        let mut node = self.node(NodeKind::Message { name }, start);
        node.children = children;
        node
    }

    fn message_item(&mut self) -> SyntaxNode {
        let next_is_ident = self.nth_kind(1) == Some(Token::Ident);
        let keyword = self
            .peek()
            .filter(|t| t.kind == Token::Ident)
            .map(|t| self.slice(&t.span))
            .unwrap_or_default();
        match keyword {
            "message" if next_is_ident => self.message(),
            "enum" if next_is_ident => self.enumeration(),
            "oneof" if next_is_ident => self.oneof(),
            "extend" if next_is_ident || self.nth_kind(1) == Some(Token::Dot) => self.extend(),
            "option" if next_is_ident || self.nth_kind(1) == Some(Token::LParen) => {
                self.option_statement()
            }
            "reserved" if self.nth_kind(1) != Some(Token::Eq) => self.reserved(),
            "extensions" if self.nth_kind(1) == Some(Token::Int) => self.extensions(),
            "map" if self.nth_kind(1) == Some(Token::LAngle) => self.map_field(),
            _ => self.field(true),
        }
    }

    fn label(&mut self) -> Option<Label> {
        let label = match self.peek().map(|t| self.slice(&t.span))? {
            "optional" => Label::Optional,
            "repeated" => Label::Repeated,
            "required" => Label::Required,
            _ => return None,
        };
        // `optional foo = 1;` declares a field of type `optional`
        if !matches!(self.nth_kind(1), Some(Token::Ident | Token::Dot)) {
            return None;
        }
        self.bump();
        Some(label)
    }

    fn field(&mut self, allow_label: bool) -> SyntaxNode {
        let item_pos = self.pos;
        let start = self.current_start();
        let label = if allow_label { self.label() } else { None };
        let Some(ty) = self.type_name() else {
            return self.fail("expected a field type", item_pos, start);
        };
        let Some(name) = self.ident() else {
            return self.fail("expected a field name", item_pos, start);
        };
        let number = match self.field_number(item_pos, start) {
            Ok(number) => number,
            Err(error) => return error,
        };
        let options = self.compact_options();
        self.expect(Token::Semi);
        let mut node = self.node(
            NodeKind::Field {
                label,
                ty,
                name,
                number,
            },
            start,
        );
        node.children = options;
        node
    }

    /// `= <int>`; a missing number is reported but the field is kept.
    fn field_number(&mut self, item_pos: usize, start: usize) -> Result<Option<i64>, SyntaxNode> {
        if self.expect(Token::Eq).is_none() {
            return Err(self.recover(item_pos, start));
        }
        let number = self.int();
        if number.is_none() {
            self.error_here("expected a field number");
        }
        Ok(number)
    }

    fn map_field(&mut self) -> SyntaxNode {
        let item_pos = self.pos;
        let start = self.current_start();
        self.bump();
        self.bump();
        let Some(key) = self.type_name() else {
            return self.fail("expected a map key type", item_pos, start);
        };
        if self.expect(Token::Comma).is_none() {
            return self.recover(item_pos, start);
        }
        let Some(value) = self.type_name() else {
            return self.fail("expected a map value type", item_pos, start);
        };
        if self.expect(Token::RAngle).is_none() {
            return self.recover(item_pos, start);
        }
        let Some(name) = self.ident() else {
            return self.fail("expected a field name", item_pos, start);
        };
        let number = match self.field_number(item_pos, start) {
            Ok(number) => number,
            Err(error) => return error,
        };
        let options = self.compact_options();
        self.expect(Token::Semi);
        let mut node = self.node(
            NodeKind::MapField {
                key,
                value,
                name,
                number,
            },
            start,
        );
        node.children = options;
        node
    }

    fn oneof(&mut self) -> SyntaxNode {
        let item_pos = self.pos;
        let start = self.current_start();
        self.bump();
        let Some(name) = self.ident() else {
            return self.fail("expected a oneof name", item_pos, start);
        };
        let children = self.block(start, Parser::oneof_item);
        let mut node = self.node(NodeKind::Oneof { name }, start);
        node.children = children;
        node
    }

    fn oneof_item(&mut self) -> SyntaxNode {
        if self.at_keyword("option")
            && matches!(self.nth_kind(1), Some(Token::Ident | Token::LParen))
        {
            self.option_statement()
        } else if self.at_keyword("map") && self.nth_kind(1) == Some(Token::LAngle) {
            self.map_field()
        } else {
            self.field(false)
        }
    }

    fn extend(&mut self) -> SyntaxNode {
        let item_pos = self.pos;
        let start = self.current_start();
        self.bump();
        let Some(extendee) = self.type_name() else {
            return self.fail("expected a message name to extend", item_pos, start);
        };
        let children = self.block(start, Parser::extend_item);
        let mut node = self.node(NodeKind::Extend { extendee }, start);
        node.children = children;
        node
    }

    fn extend_item(&mut self) -> SyntaxNode {
        self.field(true)
    }

    fn ranges(&mut self) -> Vec<FieldRange> {
        let mut ranges = Vec::new();
        loop {
            let start = self.current_start();
            let Some(low) = self.int() else {
                self.error_here("expected a field number");
                break;
            };
            let high = if self.at_keyword("to") {
                self.bump();
                if self.at_keyword("max") {
                    self.bump();
                    Some(MAX_FIELD_NUMBER)
                } else {
                    self.int()
                }
            } else {
                Some(low)
            };
            let Some(high) = high else {
                self.error_here("expected a range end");
                break;
            };
            ranges.push(FieldRange {
                start: low,
                end: high,
                span: start..self.last_end(),
            });
            if self.eat(Token::Comma).is_none() {
                break;
            }
        }
        ranges
    }

    fn reserved(&mut self) -> SyntaxNode {
        let item_pos = self.pos;
        let start = self.current_start();
        self.bump();
        let mut ranges = Vec::new();
        let mut names = Vec::new();
        match self.nth_kind(0) {
            Some(Token::Int | Token::Minus) => ranges = self.ranges(),
            Some(Token::Str | Token::Ident) => loop {
                let Some(token) = self.eat(Token::Str).or_else(|| self.eat(Token::Ident)) else {
                    self.error_here("expected a reserved name");
                    break;
                };
                names.push(Ident {
                    text: unquote(self.slice(&token.span)).to_string(),
                    span: token.span,
                });
                if self.eat(Token::Comma).is_none() {
                    break;
                }
            },
            _ => return self.fail("expected reserved numbers or names", item_pos, start),
        }
        if self.expect(Token::Semi).is_none() {
            return self.recover(item_pos, start);
        }
        self.node(NodeKind::Reserved { ranges, names }, start)
    }

    fn extensions(&mut self) -> SyntaxNode {
        let item_pos = self.pos;
        let start = self.current_start();
        self.bump();
        let ranges = self.ranges();
        let options = self.compact_options();
        if self.expect(Token::Semi).is_none() {
            return self.recover(item_pos, start);
        }
        let mut node = self.node(NodeKind::Extensions { ranges }, start);
        node.children = options;
        node
    }

    // ---- enums ----

    fn enumeration(&mut self) -> SyntaxNode {
        let item_pos = self.pos;
        let start = self.current_start();
        self.bump();
        let Some(name) = self.ident() else {
            return self.fail("expected an enum name", item_pos, start);
        };
        let children = self.block(start, Parser::enum_item);
        let mut node = self.node(NodeKind::Enum { name }, start);
        node.children = children;
        node
    }

    fn enum_item(&mut self) -> SyntaxNode {
        if self.at_keyword("option") && self.nth_kind(1) != Some(Token::Eq) {
            return self.option_statement();
        }
        if self.at_keyword("reserved") && self.nth_kind(1) != Some(Token::Eq) {
            return self.reserved();
        }

        let item_pos = self.pos;
        let start = self.current_start();
        let Some(name) = self.ident() else {
            return self.fail("expected an enum value name", item_pos, start);
        };
        if self.expect(Token::Eq).is_none() {
            return self.recover(item_pos, start);
        }
        let number = self.int();
        if number.is_none() {
            self.error_here("expected an enum value number");
        }
        let options = self.compact_options();
        self.expect(Token::Semi);
        let mut node = self.node(NodeKind::EnumValue { name, number }, start);
        node.children = options;
        node
    }

    // ---- services ----

    fn service(&mut self) -> SyntaxNode {
        let item_pos = self.pos;
        let start = self.current_start();
        self.bump();
        let Some(name) = self.ident() else {
            return self.fail("expected a service name", item_pos, start);
        };
        let children = self.block(start, Parser::service_item);
        let mut node = self.node(NodeKind::Service { name }, start);
        node.children = children;
        node
    }

    fn service_item(&mut self) -> SyntaxNode {
        if self.at_keyword("option") {
            return self.option_statement();
        }
        if self.at_keyword("rpc") {
            return self.method();
        }
        let item_pos = self.pos;
        let start = self.current_start();
        self.fail("expected 'rpc' or 'option'", item_pos, start)
    }

    /// `( [stream] Type )`
    fn method_type(&mut self) -> Option<(TypeName, bool)> {
        self.expect(Token::LParen)?;
        let streaming = self.at_keyword("stream")
            && matches!(self.nth_kind(1), Some(Token::Ident | Token::Dot));
        if streaming {
            self.bump();
        }
        let Some(ty) = self.type_name() else {
            self.error_here("expected a message type");
            return None;
        };
        self.expect(Token::RParen)?;
        Some((ty, streaming))
    }

    fn method(&mut self) -> SyntaxNode {
        let item_pos = self.pos;
        let start = self.current_start();
        self.bump();
        let Some(name) = self.ident() else {
            return self.fail("expected a method name", item_pos, start);
        };
        let Some((input, client_streaming)) = self.method_type() else {
            return self.recover(item_pos, start);
        };
        if !self.at_keyword("returns") {
            return self.fail("expected 'returns'", item_pos, start);
        }
        self.bump();
        let Some((output, server_streaming)) = self.method_type() else {
            return self.recover(item_pos, start);
        };

        let children = if self.at(Token::LBrace) {
            self.block(start, Parser::method_item)
        } else {
            self.expect(Token::Semi);
            Vec::new()
        };
        let mut node = self.node(
            NodeKind::Method {
                name,
                input,
                output,
                client_streaming,
                server_streaming,
            },
            start,
        );
        node.children = children;
        node
    }

    fn method_item(&mut self) -> SyntaxNode {
        if self.at_keyword("option") {
            return self.option_statement();
        }
        let item_pos = self.pos;
        let start = self.current_start();
        self.fail("expected 'option'", item_pos, start)
    }
}
