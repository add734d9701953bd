//! A parsed document

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::Url;

use crate::analysis::symbols::SymbolTable;
use crate::parser::{SyntaxError, SyntaxNode, parse};
use crate::workspace::line_index::LineIndex;

/// One proto file as of a specific version. Immutable once built; an edit builds a
/// new `SourceFile` and cancels the old one's token.
#[derive(Debug)]
pub struct SourceFile {
    pub uri: Url,
    pub text: String,
    /// Editor version; `None` for files loaded from disk because something imports them.
    pub version: Option<i32>,
    pub open: bool,
    pub tree: SyntaxNode,
    pub syntax_errors: Vec<SyntaxError>,
    pub table: SymbolTable,
    pub lines: LineIndex,
    cancel: CancellationToken,
}

impl SourceFile {
    pub fn new(uri: Url, text: String, version: Option<i32>, open: bool) -> Self {
        let parsed = parse(&text);
        let table = SymbolTable::build(&parsed.root);
        let lines = LineIndex::new(&text);
        Self {
            uri,
            text,
            version,
            open,
            tree: parsed.root,
            syntax_errors: parsed.errors,
            table,
            lines,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelled once a newer version of the file replaces this one.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_superseded(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn supersede(&self) {
        self.cancel.cancel();
    }

    /// Last path segment of the URI, for messages.
    pub fn file_name(&self) -> &str {
        display_name(&self.uri)
    }
}

pub fn display_name(uri: &Url) -> &str {
    uri.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| uri.as_str())
}
