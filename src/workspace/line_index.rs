//! Byte offset <-> LSP position conversion
//!
//! LSP positions count UTF-16 code units within a line; spans in the syntax tree are
//! byte offsets into the UTF-8 text.

use tower_lsp::lsp_types::{Position, Range};

use crate::parser::ast::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    /// Byte offset of the start of every line. Always starts with 0.
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            line_starts,
            len: text.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Position of a byte offset. Offsets past the end clamp to the end of the text.
    pub fn position(&self, text: &str, offset: usize) -> Position {
        let offset = clamp_to_char_boundary(text, offset.min(self.len));
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let line_start = self.line_starts[line];
        let character: usize = text[line_start..offset].chars().map(char::len_utf16).sum();
        Position::new(line as u32, character as u32)
    }

    /// Byte offset of a position. Characters past the end of a line clamp to the line end,
    /// lines past the end of the text clamp to the end of the text.
    pub fn offset(&self, text: &str, position: Position) -> usize {
        let Some(&line_start) = self.line_starts.get(position.line as usize) else {
            return self.len;
        };
        let line_end = self
            .line_starts
            .get(position.line as usize + 1)
            .map_or(self.len, |&next| next - 1);
        let line = &text[line_start..line_end];

        let mut units = 0usize;
        for (i, ch) in line.char_indices() {
            if units >= position.character as usize {
                return line_start + i;
            }
            units += ch.len_utf16();
        }
        line_end
    }

    pub fn range(&self, text: &str, span: &Span) -> Range {
        Range::new(self.position(text, span.start), self.position(text, span.end))
    }

    pub fn span(&self, text: &str, range: Range) -> Span {
        self.offset(text, range.start)..self.offset(text, range.end)
    }
}

fn clamp_to_char_boundary(text: &str, mut offset: usize) -> usize {
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
