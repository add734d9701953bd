//! Concrete syntax tree for proto files

use std::ops::Range;

/// Byte range into the source text.
pub type Span = Range<usize>;

/// Largest field number protobuf accepts.
pub const MAX_FIELD_NUMBER: i64 = 536_870_911;

/// Field numbers reserved for the protobuf implementation.
pub const RESERVED_IMPLEMENTATION_RANGE: Range<i64> = 19_000..20_000;

/// Built-in scalar value types.
pub const SCALAR_TYPES: [&str; 15] = [
    "double", "float", "int32", "int64", "uint32", "uint64", "sint32", "sint64", "fixed32",
    "fixed64", "sfixed32", "sfixed64", "bool", "string", "bytes",
];

/// A syntax error recovered from during lexing or parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
}

/// An identifier with its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub text: String,
    pub span: Span,
}

/// A possibly qualified type name such as `Foo`, `pkg.Foo.Bar` or `.pkg.Foo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    pub text: String,
    pub span: Span,
    /// Leading dot: the name is fully qualified.
    pub absolute: bool,
    pub segments: Vec<Ident>,
}

impl TypeName {
    pub fn is_scalar(&self) -> bool {
        !self.absolute && self.segments.len() == 1 && SCALAR_TYPES.contains(&self.text.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Optional,
    Repeated,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportKind {
    #[default]
    Default,
    Public,
    Weak,
}

/// Name of an option. Custom options carry the parenthesised extension name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionName {
    pub text: String,
    pub span: Span,
    pub extension: Option<TypeName>,
}

/// Inclusive field number range used by `reserved` and `extensions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRange {
    pub start: i64,
    pub end: i64,
    pub span: Span,
}

impl FieldRange {
    pub fn contains(&self, number: i64) -> bool {
        self.start <= number && number <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    File,
    /// `syntax = "proto3";` or `edition = "2023";`
    Syntax {
        value: String,
        edition: bool,
    },
    Package {
        name: TypeName,
    },
    Import {
        path: String,
        path_span: Span,
        kind: ImportKind,
    },
    Option {
        name: OptionName,
        value: String,
    },
    Message {
        name: Ident,
    },
    Enum {
        name: Ident,
    },
    EnumValue {
        name: Ident,
        number: Option<i64>,
    },
    Field {
        label: Option<Label>,
        ty: TypeName,
        name: Ident,
        number: Option<i64>,
    },
    MapField {
        key: TypeName,
        value: TypeName,
        name: Ident,
        number: Option<i64>,
    },
    Oneof {
        name: Ident,
    },
    Extend {
        extendee: TypeName,
    },
    Service {
        name: Ident,
    },
    Method {
        name: Ident,
        input: TypeName,
        output: TypeName,
        client_streaming: bool,
        server_streaming: bool,
    },
    Reserved {
        ranges: Vec<FieldRange>,
        names: Vec<Ident>,
    },
    Extensions {
        ranges: Vec<FieldRange>,
    },
    /// Input the parser skipped while recovering.
    Error,
}

/// A node of the syntax tree. Children are in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub span: Span,
    pub children: Vec<SyntaxNode>,
    /// Comments directly preceding the declaration, verbatim.
    pub comments: Vec<String>,
}

impl SyntaxNode {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            span,
            children: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// The declared name, for nodes that declare one.
    pub fn name(&self) -> Option<&Ident> {
        match &self.kind {
            NodeKind::Message { name }
            | NodeKind::Enum { name }
            | NodeKind::EnumValue { name, .. }
            | NodeKind::Field { name, .. }
            | NodeKind::MapField { name, .. }
            | NodeKind::Oneof { name }
            | NodeKind::Service { name }
            | NodeKind::Method { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Field number of fields, map fields and enum values.
    pub fn number(&self) -> Option<i64> {
        match &self.kind {
            NodeKind::Field { number, .. }
            | NodeKind::MapField { number, .. }
            | NodeKind::EnumValue { number, .. } => *number,
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, NodeKind::Error)
    }

    /// Pre-order traversal of this node and all descendants.
    pub fn descendants(&self) -> impl Iterator<Item = &SyntaxNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    /// The chain of nodes whose span contains `offset`, outermost first.
    pub fn path_to(&self, offset: usize) -> Vec<&SyntaxNode> {
        let mut path = Vec::new();
        let mut current = self;
        if !contains(&current.span, offset) {
            return path;
        }
        path.push(current);
        while let Some(child) = current
            .children
            .iter()
            .find(|child| contains(&child.span, offset))
        {
            path.push(child);
            current = child;
        }
        path
    }

    /// Value of an option declared directly under this node, e.g. `allow_alias`.
    pub fn option_value(&self, option: &str) -> Option<&str> {
        self.children.iter().find_map(|child| match &child.kind {
            NodeKind::Option { name, value } if name.text == option => Some(value.as_str()),
            _ => None,
        })
    }
}

/// Span containment that treats the end as inclusive, so a cursor placed right after
/// an identifier still hits it.
pub fn contains(span: &Span, offset: usize) -> bool {
    span.start <= offset && offset <= span.end
}

/// Parses a protobuf integer literal (decimal, hex or octal).
pub fn parse_int(text: &str) -> Option<i64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if text.len() > 1 && text.starts_with('0') {
        i64::from_str_radix(&text[1..], 8).ok()
    } else {
        text.parse().ok()
    }
}

/// Strips the quotes from a string literal. Escapes are kept as written.
pub fn unquote(text: &str) -> &str {
    let trimmed = text.strip_prefix(['"', '\'']).unwrap_or(text);
    trimmed.strip_suffix(['"', '\'']).unwrap_or(trimmed)
}
