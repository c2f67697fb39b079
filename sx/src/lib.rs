pub mod include;
pub mod node;
pub mod parser;

use crate::node::Element;

/// A parsed sx document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Synthetic root element holding the top-level nodes.
    pub root: Element,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
}
