//! Tokenizer for proto source text

use logos::Logos;

use crate::parser::ast::{Span, SyntaxError};

/// Raw tokens produced by logos.
///
/// Keywords are lexed as [`Token::Ident`]; protobuf keywords are contextual and the
/// parser decides what an identifier means from its position.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    #[regex(r"0[xX][0-9a-fA-F]+|[0-9]+")]
    Int,

    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?|[0-9]+[eE][+-]?[0-9]+")]
    Float,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#)]
    Str,

    #[regex(r"//[^\n]*")]
    LineComment,

    #[token("/*", block_comment)]
    BlockComment,

    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("<")]
    LAngle,
    #[token(">")]
    RAngle,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("=")]
    Eq,
    #[token(":")]
    Colon,
    #[token("-")]
    Minus,
    #[token("+")]
    Plus,
}

impl Token {
    pub fn describe(self) -> &'static str {
        match self {
            Token::Ident => "identifier",
            Token::Int => "integer",
            Token::Float => "float",
            Token::Str => "string",
            Token::LineComment | Token::BlockComment => "comment",
            Token::LBrace => "'{'",
            Token::RBrace => "'}'",
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::LBracket => "'['",
            Token::RBracket => "']'",
            Token::LAngle => "'<'",
            Token::RAngle => "'>'",
            Token::Semi => "';'",
            Token::Comma => "','",
            Token::Dot => "'.'",
            Token::Eq => "'='",
            Token::Colon => "':'",
            Token::Minus => "'-'",
            Token::Plus => "'+'",
        }
    }
}

/// Consumes a block comment body; an unterminated comment runs to the end of input
/// and is reported as an error.
fn block_comment(lex: &mut logos::Lexer<Token>) -> bool {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => {
            lex.bump(lex.remainder().len());
            false
        }
    }
}

/// A significant token with its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub kind: Token,
    pub span: Span,
}

/// Output of [`tokenize`]: significant tokens, comment spans and lexical errors.
#[derive(Debug, Default)]
pub struct Lexed {
    pub tokens: Vec<Lexeme>,
    pub comments: Vec<Span>,
    pub errors: Vec<SyntaxError>,
}

/// Tokenize source text.
///
/// Comments are split off from the token stream so the parser can attach them to
/// declarations. Runs of unrecognised input are coalesced into a single error.
pub fn tokenize(source: &str) -> Lexed {
    let mut lexer = Token::lexer(source);
    let mut lexed = Lexed::default();
    let mut pending_error: Option<Span> = None;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => {
                if let Some(error) = pending_error.take() {
                    lexed.errors.push(invalid_input(source, error));
                }
                match token {
                    Token::LineComment | Token::BlockComment => lexed.comments.push(span),
                    kind => lexed.tokens.push(Lexeme { kind, span }),
                }
            }
            Err(()) => {
                pending_error = match pending_error {
                    Some(error) if error.end == span.start => Some(error.start..span.end),
                    Some(error) => {
                        lexed.errors.push(invalid_input(source, error));
                        Some(span)
                    }
                    None => Some(span),
                };
            }
        }
    }

    if let Some(error) = pending_error {
        lexed.errors.push(invalid_input(source, error));
    }

    lexed
}

fn invalid_input(source: &str, span: Span) -> SyntaxError {
    let text = &source[span.clone()];
    let message = if text.starts_with("/*") {
        "unterminated block comment".to_string()
    } else if text.starts_with('"') || text.starts_with('\'') {
        "unterminated string literal".to_string()
    } else {
        format!("unexpected input {:?}", text.chars().take(16).collect::<String>())
    };
    SyntaxError { message, span }
}
