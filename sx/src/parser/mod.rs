pub mod error;
mod lexer;
mod tree;

pub use error::{ParseError, SyntaxErrorKind};

use crate::Document;

/// Parser entry point.
pub struct Parser {
    source: String,
    file_id: usize,
}

impl Parser {
    pub fn new(source: String, file_id: usize) -> Self {
        Parser { source, file_id }
    }

    /// Parse the source into a Document. The first syntax error aborts.
    pub fn parse(&self) -> Result<Document, ParseError> {
        let root = tree::parse_root(&self.source, self.file_id)?;
        Ok(Document {
            root,
            source_id: self.file_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::node::{Element, Node};

    fn parse(source: &str) -> Vec<Node> {
        Parser::new(source.to_string(), 0)
            .parse()
            .expect("parse failed")
            .root
            .children
    }

    fn parse_err(source: &str) -> ParseError {
        Parser::new(source.to_string(), 0)
            .parse()
            .expect_err("expected a syntax error")
    }

    fn element(node: &Node) -> &Element {
        node.as_element().expect("expected an element")
    }

    #[test]
    fn nested_lists() {
        let nodes = parse("(html (body (p \"hi\")))");
        assert_eq!(nodes.len(), 1);
        let html = element(&nodes[0]);
        assert_eq!(html.head, "html");
        let body = element(&html.children[0]);
        let p = element(&body.children[0]);
        assert_eq!(p.children, vec![Node::text("hi")]);
        assert_eq!(html.span, 0..22);
    }

    #[test]
    fn whitespace_separates_arguments_and_adjacent_tokens_join() {
        let nodes = parse("(p one \"two three\"four 'five')");
        let p = element(&nodes[0]);
        assert_eq!(
            p.children,
            vec![
                Node::text("one"),
                Node::text("two threefour"),
                Node::text("five"),
            ]
        );
    }

    #[test]
    fn attribute_groups_merge_in_order() {
        let nodes = parse("(a [href=\"/x\" class=link] \"go\" [class=\"big\" hidden])");
        let a = element(&nodes[0]);
        assert_eq!(a.groups.len(), 2);
        let attrs: Vec<_> = a.attributes().into_iter().collect();
        assert_eq!(
            attrs,
            vec![
                ("href".to_string(), Some("/x".to_string())),
                ("class".to_string(), Some("big".to_string())),
                ("hidden".to_string(), None),
            ]
        );
        assert_eq!(a.children, vec![Node::text("go")]);
    }

    #[test]
    fn control_flow_groups_keep_raw_items() {
        let nodes = parse("(@while [f \"n=1\" \"f=n<=3\"][\"n+=1; f=n<=3\"] x)");
        let w = element(&nodes[0]);
        let first: Vec<_> = w.groups[0].raw_items().collect();
        assert_eq!(first, vec!["f", "n=1", "f=n<=3"]);
        let second: Vec<_> = w.groups[1].raw_items().collect();
        assert_eq!(second, vec!["n+=1; f=n<=3"]);
    }

    #[test]
    fn raw_block_is_kept_verbatim() {
        let nodes = parse("(style \"\"\"[\n  p { color: red; }\n]\"\"\")");
        let style = element(&nodes[0]);
        assert_eq!(
            style.children,
            vec![Node::RawBlock("\n  p { color: red; }\n".to_string())]
        );
    }

    #[test]
    fn include_forms() {
        let nodes = parse("(style {\"a.css\" b.css}) (script \"\"\"[ \"c.js\" ]\"\"\")");
        let style = element(&nodes[0]);
        assert!(matches!(&style.children[0], Node::Include { path, .. } if path == "a.css"));
        assert!(matches!(&style.children[1], Node::Include { path, .. } if path == "b.css"));
        let script = element(&nodes[1]);
        assert!(matches!(&script.children[0], Node::Include { path, .. } if path == "c.js"));
    }

    #[test]
    fn comments() {
        let nodes = parse("(#comment (a b) \"c\") (@comment \"--> X <!--\")");
        assert_eq!(nodes, vec![Node::Comment("--> X <!--".to_string())]);
    }

    #[test]
    fn unbalanced_parentheses() {
        let err = parse_err("(p (b \"x\")");
        assert_eq!(err.kind, SyntaxErrorKind::Unclosed(')'));
        assert_eq!(err.offset(), 0);

        let err = parse_err("(p \"x\"))");
        assert_eq!(err.kind, SyntaxErrorKind::UnexpectedClose(')'));
        assert_eq!(err.offset(), 7);

        let err = parse_err("(p [a=1)");
        assert_eq!(
            err.kind,
            SyntaxErrorKind::Mismatched {
                expected: ']',
                found: ')'
            }
        );
    }

    #[test]
    fn list_needs_a_head() {
        assert_eq!(parse_err("()").kind, SyntaxErrorKind::MissingHead);
        assert_eq!(parse_err("(\"p\" x)").kind, SyntaxErrorKind::MissingHead);
        assert_eq!(parse("( p)").len(), 1);
    }

    #[test]
    fn attribute_group_outside_list() {
        assert_eq!(
            parse_err("[a=1]").kind,
            SyntaxErrorKind::MisplacedAttributeGroup
        );
    }

    #[test]
    fn comment_rejects_nested_lists() {
        assert_eq!(
            parse_err("(@comment (b x))").kind,
            SyntaxErrorKind::InvalidComment
        );
    }
}
