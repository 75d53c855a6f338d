//! Source location tracking, shared by every stage of the pipeline.

use crate::source::SourceHandle;
use std::fmt;

/// A byte offset range into one source file, plus the line/column pair at
/// each end. Cheap to copy; every [`Token`](crate::lexer::Token) and AST node
/// carries one of these so diagnostics can always point back at source text.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Span {
    pub file: SourceHandle,
    pub offset: usize,
    pub length: usize,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Span {
    /// A span with no meaningful location, used for synthesized nodes (e.g.
    /// declarations materialized from a native-module library).
    pub fn synthetic(file: SourceHandle) -> Self {
        Self {
            file,
            offset: 0,
            length: 0,
            start_line: 0,
            start_col: 0,
            end_line: 0,
            end_col: 0,
        }
    }

    /// Combine two spans into one that covers both. Both must point into the
    /// same source file.
    pub fn join(self, other: Span) -> Span {
        debug_assert_eq!(self.file, other.file);
        let (start, end) = if self.offset <= other.offset {
            (self, other)
        } else {
            (other, self)
        };
        Span {
            file: start.file,
            offset: start.offset,
            length: (end.offset + end.length).saturating_sub(start.offset),
            start_line: start.start_line,
            start_col: start.start_col,
            end_line: end.end_line,
            end_col: end.end_col,
        }
    }

    /// Slice the original source text that this span covers.
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        let end = (self.offset + self.length).min(source.len());
        let start = self.offset.min(end);
        &source[start..end]
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}
