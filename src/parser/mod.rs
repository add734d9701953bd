//! Parser layer
//! - lexer.rs: logos tokenizer
//! - ast.rs: syntax tree types (SyntaxNode, NodeKind, spans)
//! - grammar.rs: error-tolerant recursive-descent parser

pub mod ast;
pub mod grammar;
pub mod lexer;

pub use ast::{NodeKind, Span, SyntaxError, SyntaxNode};
pub use grammar::{Parse, parse};
