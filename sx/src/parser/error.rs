use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};

/// What went wrong while reading the source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyntaxErrorKind {
    #[error("unmatched '{found}', expected '{expected}'")]
    Mismatched { expected: char, found: char },
    #[error("unexpected '{0}' with no matching opening bracket")]
    UnexpectedClose(char),
    #[error("missing '{0}'")]
    Unclosed(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated raw block, expected ']\"\"\"'")]
    UnterminatedRawBlock,
    #[error("list must start with a tag name")]
    MissingHead,
    #[error("attribute group outside of a list")]
    MisplacedAttributeGroup,
    #[error("unexpected {0} inside attribute group")]
    InvalidAttribute(&'static str),
    #[error("unexpected {0} inside include group")]
    InvalidInclude(&'static str),
    #[error("@comment accepts only text")]
    InvalidComment,
}

/// A fatal syntax error with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: SyntaxErrorKind,
    pub span: Range<usize>,
    pub file_id: usize,
    pub notes: Vec<String>,
}

impl ParseError {
    pub fn new(kind: SyntaxErrorKind, span: Range<usize>, file_id: usize) -> Self {
        ParseError {
            kind,
            span,
            file_id,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Byte offset of the offending input.
    pub fn offset(&self) -> usize {
        self.span.start
    }

    pub fn message(&self) -> String {
        format!("syntax error: {}", self.kind)
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        Diagnostic::new(Severity::Error)
            .with_message(self.message())
            .with_labels(vec![Label::primary(self.file_id, self.span.clone())])
            .with_notes(self.notes.clone())
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at byte {}", self.message(), self.span.start)
    }
}

impl std::error::Error for ParseError {}
