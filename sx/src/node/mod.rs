use std::ops::Range;

use indexmap::IndexMap;

/// Head of the synthetic element that wraps a whole document.
pub const ROOT_HEAD: &str = ":root";

/// A node of the sx tree.
///
/// The reader produces `Element`, `Text`, `RawBlock`, `Comment` and `Include`.
/// `Markup` only appears after directive evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Plain text, escaped on output.
    Text(String),
    /// Triple-quoted literal content or the contents of an included file.
    RawBlock(String),
    /// Verbatim content of an `@comment`.
    Comment(String),
    /// Already-rendered HTML produced by a scripting directive.
    Markup(String),
    /// A file include waiting for `include::resolve_includes`.
    Include { path: String, span: Range<usize> },
}

impl Node {
    pub fn text(s: impl Into<String>) -> Self {
        Node::Text(s.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }
}

/// A list node: `(head [groups...] children...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Never empty.
    pub head: String,
    /// Bracketed attribute groups in source order.
    pub groups: Vec<AttributeGroup>,
    pub children: Vec<Node>,
    /// Byte span in source for error reporting.
    pub span: Range<usize>,
}

impl Element {
    pub fn new(head: impl Into<String>) -> Self {
        Element {
            head: head.into(),
            groups: Vec::new(),
            children: Vec::new(),
            span: 0..0,
        }
    }

    pub fn root(children: Vec<Node>, span: Range<usize>) -> Self {
        Element {
            head: ROOT_HEAD.to_string(),
            groups: Vec::new(),
            children,
            span,
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Append a group holding a single attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.groups.push(AttributeGroup {
            items: vec![Attribute::new(key, value)],
        });
        self
    }

    pub fn with_groups(mut self, groups: Vec<AttributeGroup>) -> Self {
        self.groups = groups;
        self
    }

    pub fn is_root(&self) -> bool {
        self.head == ROOT_HEAD
    }

    /// Case-insensitive head comparison.
    pub fn is(&self, head: &str) -> bool {
        self.head.eq_ignore_ascii_case(head)
    }

    /// Merged attribute collection.
    ///
    /// Groups merge left to right. A repeated key takes the later value but
    /// keeps the position of its first appearance.
    pub fn attributes(&self) -> IndexMap<String, Option<String>> {
        let mut merged = IndexMap::new();
        for attribute in self.groups.iter().flat_map(|g| &g.items) {
            merged.insert(attribute.key.clone(), attribute.value.clone());
        }
        merged
    }

    /// Concatenated text of the direct `Text` and `RawBlock` children.
    pub fn text_content(&self) -> String {
        self.children
            .iter()
            .filter_map(|child| match child {
                Node::Text(s) | Node::RawBlock(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// One bracketed `[ ... ]` group.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeGroup {
    pub items: Vec<Attribute>,
}

impl AttributeGroup {
    /// Raw text of every item, in order.
    pub fn raw_items(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.raw.as_str())
    }
}

/// A single attribute item.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub key: String,
    /// `None` for a bare item such as `[hidden]`.
    pub value: Option<String>,
    /// The item as written, quotes removed.
    pub raw: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: Option<String>) -> Self {
        let key = key.into();
        let raw = match &value {
            Some(v) => format!("{}={}", key, v),
            None => key.clone(),
        };
        Attribute { key, value, raw }
    }

    /// Build an attribute from the pieces of one item.
    ///
    /// The key/value split happens at the first `=` inside an unquoted piece;
    /// quoted pieces never split.
    pub fn from_pieces(pieces: &[(String, bool)]) -> Self {
        let raw: String = pieces.iter().map(|(text, _)| text.as_str()).collect();
        let mut key = String::new();
        for (index, (text, quoted)) in pieces.iter().enumerate() {
            if !quoted {
                if let Some(eq) = text.find('=') {
                    key.push_str(&text[..eq]);
                    let mut value = text[eq + 1..].to_string();
                    for (rest, _) in &pieces[index + 1..] {
                        value.push_str(rest);
                    }
                    return Attribute {
                        key,
                        value: Some(value),
                        raw,
                    };
                }
            }
            key.push_str(text);
        }
        Attribute {
            key,
            value: None,
            raw,
        }
    }
}
