//! Source positions used in diagnostics.
//!
//! A line/column pair computed from a `ruff_text_size::TextRange`, kept
//! deliberately small since this crate compiles one procedure namespace at a
//! time rather than tracking a persistent multi-file line index.

use std::fmt;

use ruff_text_size::{Ranged, TextRange};

/// A single line/column location (0-indexed line, 0-indexed column by byte offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// A span naming the procedure it was found in, for diagnostics that cross
/// procedure boundaries (e.g. a tail-call arity mismatch).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceSpan {
    pub procedure: String,
    pub start: SourcePos,
    pub end: SourcePos,
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.procedure, self.start, self.end)
    }
}

/// Converts byte offsets within one procedure's source snippet into
/// line/column positions, by scanning newlines once up front.
pub struct LineIndex {
    /// Byte offset of the start of each line.
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (offset, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(u32::try_from(offset + 1).expect("source too large"));
            }
        }
        Self { line_starts }
    }

    fn pos_at(&self, offset: u32) -> SourcePos {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line - 1,
        };
        let column = offset - self.line_starts[line];
        SourcePos {
            line: u32::try_from(line).expect("line count too large"),
            column,
        }
    }

    pub fn span(&self, procedure: &str, range: TextRange) -> SourceSpan {
        SourceSpan {
            procedure: procedure.to_owned(),
            start: self.pos_at(range.start().into()),
            end: self.pos_at(range.end().into()),
        }
    }
}

/// Helper for call sites that already have a `Ranged` AST node.
pub fn range_of<T: Ranged>(node: &T) -> TextRange {
    node.range()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_finds_second_line() {
        let index = LineIndex::new("abc\ndef\n");
        let pos = index.pos_at(5);
        assert_eq!(pos, SourcePos { line: 1, column: 1 });
    }

    #[test]
    fn line_index_first_line_is_zero() {
        let index = LineIndex::new("abc\ndef\n");
        let pos = index.pos_at(0);
        assert_eq!(pos, SourcePos { line: 0, column: 0 });
    }
}
