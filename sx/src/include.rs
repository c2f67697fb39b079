//! Post-parse include resolution.
//!
//! The reader leaves `{ "path" }` groups and single-path raw blocks as
//! `Node::Include`. Resolution replaces each with a `Node::RawBlock` holding
//! the file contents, read through a `SourceLoader`.

use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};

use codespan_reporting::diagnostic::{Diagnostic, Label};

use crate::Document;
use crate::node::Node;

/// Reads included files. The compiler never touches the filesystem directly.
pub trait SourceLoader {
    fn load(&self, path: &str) -> io::Result<String>;
}

impl<F> SourceLoader for F
where
    F: Fn(&str) -> io::Result<String>,
{
    fn load(&self, path: &str) -> io::Result<String> {
        self(path)
    }
}

/// Loads files relative to a base directory (normally the source file's).
#[derive(Debug, Clone)]
pub struct FsLoader {
    base_dir: PathBuf,
}

impl FsLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FsLoader {
            base_dir: base_dir.into(),
        }
    }

    /// Loader rooted at the directory containing `source_path`.
    pub fn for_source(source_path: &Path) -> Self {
        let base = source_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        FsLoader::new(base)
    }
}

impl SourceLoader for FsLoader {
    fn load(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(self.base_dir.join(path))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("cannot read included file '{path}': {source}")]
pub struct IncludeError {
    pub path: String,
    pub span: Range<usize>,
    pub file_id: usize,
    #[source]
    pub source: io::Error,
}

impl IncludeError {
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        Diagnostic::error()
            .with_message(self.to_string())
            .with_labels(vec![Label::primary(self.file_id, self.span.clone())])
    }
}

/// Replace every include in the document. Returns the number of files loaded.
pub fn resolve_includes(
    document: &mut Document,
    loader: &dyn SourceLoader,
) -> Result<usize, IncludeError> {
    let file_id = document.source_id;
    resolve_nodes(&mut document.root.children, loader, file_id)
}

fn resolve_nodes(
    nodes: &mut [Node],
    loader: &dyn SourceLoader,
    file_id: usize,
) -> Result<usize, IncludeError> {
    let mut loaded = 0;
    for node in nodes.iter_mut() {
        match node {
            Node::Include { path, span } => {
                let content = loader.load(path).map_err(|source| IncludeError {
                    path: path.clone(),
                    span: span.clone(),
                    file_id,
                    source,
                })?;
                *node = Node::RawBlock(content);
                loaded += 1;
            }
            Node::Element(el) => loaded += resolve_nodes(&mut el.children, loader, file_id)?,
            _ => {}
        }
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::parser::Parser;

    fn parse(source: &str) -> Document {
        Parser::new(source.to_string(), 0).parse().unwrap()
    }

    #[test]
    fn includes_become_raw_blocks() {
        let mut doc = parse("(style {\"a.css\"}) (p (pre {b.txt}))");
        let loader = |path: &str| -> io::Result<String> { Ok(format!("<{}>", path)) };
        assert_eq!(resolve_includes(&mut doc, &loader).unwrap(), 2);

        let style = doc.root.children[0].as_element().unwrap();
        assert_eq!(style.children, vec![Node::RawBlock("<a.css>".into())]);
        let p = doc.root.children[1].as_element().unwrap();
        let pre = p.children[0].as_element().unwrap();
        assert_eq!(pre.children, vec![Node::RawBlock("<b.txt>".into())]);
    }

    #[test]
    fn missing_file_reports_path_and_span() {
        let mut doc = parse("(style {\"gone.css\"})");
        let loader =
            |_: &str| -> io::Result<String> { Err(io::Error::from(io::ErrorKind::NotFound)) };
        let err = resolve_includes(&mut doc, &loader).unwrap_err();
        assert_eq!(err.path, "gone.css");
        assert_eq!(err.span, 8..18);
    }

    #[test]
    fn fs_loader_reads_relative_to_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("dict.txt")).unwrap();
        writeln!(file, "漢字:かん,じ").unwrap();

        let loader = FsLoader::for_source(&dir.path().join("page.sx"));
        assert_eq!(loader.load("dict.txt").unwrap(), "漢字:かん,じ\n");
    }
}
