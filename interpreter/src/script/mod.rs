//! The scripting bridge: an in-process host with a namespace shared by every
//! snippet of a document, and isolated subprocess evaluation.

pub mod rhai_host;
pub mod subprocess;

pub use rhai_host::RhaiHost;
pub use subprocess::{SubprocessError, SubprocessRunner};

/// Variable a snippet assigns to emit HTML.
pub const RESULT_VARIABLE: &str = "HTML";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{language} error: {message}")]
pub struct ScriptError {
    pub language: String,
    pub message: String,
}

impl ScriptError {
    pub fn new(language: &str, message: impl Into<String>) -> Self {
        ScriptError {
            language: language.to_string(),
            message: message.into(),
        }
    }
}

/// An in-process interpreter whose state persists across calls.
pub trait ScriptHost {
    /// Canonical language name, as written after `@`.
    fn language(&self) -> &str;

    /// Other names accepted for this host.
    fn aliases(&self) -> &[&str] {
        &[]
    }

    fn accepts(&self, language: &str) -> bool {
        language.eq_ignore_ascii_case(self.language())
            || self
                .aliases()
                .iter()
                .any(|alias| language.eq_ignore_ascii_case(alias))
    }

    /// Clear the result variable, run `code`, and return the result variable
    /// as text if the snippet assigned it.
    fn eval(&mut self, code: &str) -> Result<Option<String>, ScriptError>;

    /// Run `code` for its side effects only.
    fn exec(&mut self, code: &str) -> Result<(), ScriptError>;

    /// Truthiness of a namespace variable. Unknown names are false.
    fn is_truthy(&self, name: &str) -> bool;

    /// Publish a string variable into the namespace.
    fn bind(&mut self, name: &str, value: &str);
}
