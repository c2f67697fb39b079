use std::fmt;
use std::ops::Range;

use crate::ruby::RubyError;
use crate::script::ScriptError;
use crate::script::subprocess::SubprocessError;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
    #[error("no {mode} evaluator for language '{language}'")]
    UnknownLanguage {
        mode: &'static str,
        language: String,
    },
    #[error("malformed {directive}: {reason}")]
    MalformedDirective { directive: String, reason: String },
    #[error(transparent)]
    Ruby(#[from] RubyError),
    #[error("include '{0}' was not resolved before rendering")]
    UnresolvedInclude(String),
    #[error("{0}")]
    Custom(String),
}

impl RuntimeError {
    pub fn malformed(directive: &str, reason: impl Into<String>) -> Self {
        RuntimeError::MalformedDirective {
            directive: directive.to_string(),
            reason: reason.into(),
        }
    }
}

/// A runtime error or warning enriched with source location information.
#[derive(Debug)]
pub struct DiagnosticError {
    pub error: RuntimeError,
    pub span: Option<Range<usize>>,
    pub source_id: usize,
    pub is_warning: bool,
}

impl DiagnosticError {
    pub fn new(error: RuntimeError, span: Range<usize>, source_id: usize) -> Self {
        DiagnosticError {
            error,
            span: Some(span),
            source_id,
            is_warning: false,
        }
    }

    /// Create a warning diagnostic with a source span.
    pub fn warning(message: String, span: Range<usize>, source_id: usize) -> Self {
        DiagnosticError {
            error: RuntimeError::Custom(message),
            span: Some(span),
            source_id,
            is_warning: true,
        }
    }
}

impl From<RuntimeError> for DiagnosticError {
    fn from(error: RuntimeError) -> Self {
        DiagnosticError {
            error,
            span: None,
            source_id: 0,
            is_warning: false,
        }
    }
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for DiagnosticError {}
