pub mod control_flow;
pub mod dispatcher;
pub mod environment;
pub mod error;
pub mod ruby;
pub mod script;
pub mod serializer;
pub mod text;

pub use environment::Environment;
pub use error::{DiagnosticError, RuntimeError};
pub use serializer::SerializeOptions;

use sx::Document;
use sx::include::{IncludeError, SourceLoader, resolve_includes};
use sx::parser::{ParseError, Parser};

use crate::dispatcher::Dispatcher;

/// Any failure on the way from source text to HTML.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Include(#[from] IncludeError),
    #[error(transparent)]
    Runtime(#[from] DiagnosticError),
}

/// Evaluate every directive of an include-resolved document and serialize
/// the result. Returns the HTML together with any warnings.
pub fn render_document(
    document: &Document,
    env: &mut Environment,
    options: &SerializeOptions,
) -> Result<(String, Vec<DiagnosticError>), DiagnosticError> {
    let mut dispatcher = Dispatcher::new(env, document.source_id, options.tab_width);
    let resolved = dispatcher.resolve_root(&document.root)?;
    let warnings = dispatcher.into_diagnostics();
    Ok((serializer::serialize(&resolved, options), warnings))
}

/// Parse, resolve includes and render in one go.
pub fn compile(
    source: &str,
    source_id: usize,
    loader: &dyn SourceLoader,
    env: &mut Environment,
    options: &SerializeOptions,
) -> Result<(String, Vec<DiagnosticError>), CompileError> {
    let mut document = Parser::new(source.to_string(), source_id).parse()?;
    let loaded = resolve_includes(&mut document, loader)?;
    tracing::debug!(loaded, "includes resolved");
    Ok(render_document(&document, env, options)?)
}
