//! HTML output with the layout rules of the compiler: block elements on
//! their own indented lines, inline elements in place, raw-text bodies
//! reindented, preformatted bodies untouched.

use sx::node::{Element, Node};

use crate::text::{escape_attribute, escape_text, reindent};

const DOCTYPE_HEAD: &str = "!doctype";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    /// Open tag only, on its own line.
    Void,
    /// Open tag only, in place.
    InlineVoid,
    Inline,
    /// Own line, content kept on that line.
    SingleLine,
    /// `script`/`style`: body reindented between tags on their own lines.
    RawText,
    Preformatted,
    Block,
}

impl TagClass {
    pub fn of(head: &str) -> Self {
        let name = head.to_ascii_lowercase();
        let name = name.as_str();
        let void = is_void(name);
        let inline = is_inline(name);
        match name {
            _ if void && inline => TagClass::InlineVoid,
            _ if void => TagClass::Void,
            _ if inline => TagClass::Inline,
            "title" => TagClass::SingleLine,
            "script" | "style" => TagClass::RawText,
            "pre" => TagClass::Preformatted,
            _ => TagClass::Block,
        }
    }
}

fn is_void(name: &str) -> bool {
    matches!(
        name,
        "area" | "base" | "bgsound" | "br" | "col" | "embed" | "frame" | "hr" | "image"
            | "img" | "input" | "keygen" | "link" | "menuitem" | "meta" | "param" | "source"
            | "track" | "wbr"
    )
}

fn is_inline(name: &str) -> bool {
    matches!(
        name,
        "a" | "abbr" | "acronym" | "audio" | "b" | "bdi" | "bdo" | "big" | "blink" | "br"
            | "button" | "canvas" | "cite" | "code" | "data" | "del" | "dfn" | "em" | "font"
            | "i" | "img" | "input" | "ins" | "kbd" | "label" | "mark" | "meter" | "nobr"
            | "output" | "progress" | "q" | "rb" | "rbc" | "rp" | "rt" | "rtc" | "ruby" | "s"
            | "samp" | "small" | "spacer" | "span" | "strike" | "strong" | "sub" | "sup"
            | "textarea" | "th" | "td" | "time" | "tt" | "u" | "var" | "wbr"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Spaces per nesting level.
    pub indent_width: usize,
    pub tab_width: usize,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        SerializeOptions {
            indent_width: 2,
            tab_width: 4,
        }
    }
}

/// Serialize a resolved tree. Directive heads must already be gone.
pub fn serialize(root: &Element, options: &SerializeOptions) -> String {
    let mut writer = HtmlWriter {
        out: String::new(),
        level: 0,
        options,
    };
    writer.element(root);
    if !writer.out.is_empty() && !writer.out.ends_with('\n') {
        writer.out.push('\n');
    }
    writer.out
}

struct HtmlWriter<'o> {
    out: String,
    level: usize,
    options: &'o SerializeOptions,
}

impl HtmlWriter<'_> {
    fn indent_for(&self, level: usize) -> String {
        " ".repeat(level * self.options.indent_width)
    }

    /// Move to a fresh line at the current level.
    fn start_line(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        let indent = self.indent_for(self.level);
        self.out.push_str(&indent);
    }

    /// Text continuing after a block close starts on an indented line.
    fn continue_line(&mut self) {
        if self.out.ends_with('\n') {
            let indent = self.indent_for(self.level);
            self.out.push_str(&indent);
        }
    }

    fn nodes(&mut self, nodes: &[Node]) {
        for node in nodes {
            self.node(node);
        }
    }

    fn node(&mut self, node: &Node) {
        match node {
            Node::Element(el) => self.element(el),
            Node::Text(text) => {
                self.continue_line();
                self.out.push_str(&escape_text(text));
            }
            Node::RawBlock(text) | Node::Markup(text) => {
                self.continue_line();
                self.out.push_str(text);
            }
            Node::Comment(text) => {
                self.start_line();
                self.out.push_str("<!-- ");
                self.out.push_str(text);
                self.out.push_str(" -->\n");
            }
            // resolved before rendering
            Node::Include { .. } => {}
        }
    }

    fn element(&mut self, el: &Element) {
        if el.is_root() {
            self.nodes(&el.children);
            return;
        }
        if el.is(DOCTYPE_HEAD) {
            self.start_line();
            self.out.push('<');
            self.out.push_str(&el.head);
            let args = el.text_content();
            let args = args.trim();
            if !args.is_empty() {
                self.out.push(' ');
                self.out.push_str(args);
            }
            self.out.push_str(">\n");
            return;
        }

        match TagClass::of(&el.head) {
            TagClass::InlineVoid => self.open_tag(el),
            TagClass::Void => {
                self.start_line();
                self.open_tag(el);
            }
            TagClass::Inline => {
                self.continue_line();
                self.open_tag(el);
                self.nodes(&el.children);
                self.close_tag(el);
            }
            TagClass::SingleLine => {
                self.start_line();
                self.open_tag(el);
                self.nodes(&el.children);
                self.close_tag(el);
                self.out.push('\n');
            }
            TagClass::RawText => {
                self.start_line();
                self.open_tag(el);
                self.out.push('\n');
                let body = self.raw_body(&el.children);
                let indent = self.indent_for(self.level + 1);
                self.out
                    .push_str(&reindent(&indent, &body, self.options.tab_width));
                self.start_line();
                self.close_tag(el);
                self.out.push('\n');
            }
            TagClass::Preformatted => {
                self.start_line();
                self.open_tag(el);
                self.preformatted(&el.children);
                self.close_tag(el);
                self.out.push('\n');
            }
            TagClass::Block => {
                self.start_line();
                self.open_tag(el);
                let mark = self.out.len();
                self.level += 1;
                self.nodes(&el.children);
                self.level -= 1;
                if self.out[mark..].contains('\n') {
                    self.start_line();
                }
                self.close_tag(el);
                self.out.push('\n');
            }
        }
    }

    fn preformatted(&mut self, nodes: &[Node]) {
        for node in nodes {
            match node {
                Node::Text(text) | Node::RawBlock(text) => self.out.push_str(&escape_text(text)),
                Node::Markup(html) => self.out.push_str(html),
                Node::Element(el) => {
                    self.open_tag(el);
                    self.preformatted(&el.children);
                    if !matches!(TagClass::of(&el.head), TagClass::Void | TagClass::InlineVoid) {
                        self.close_tag(el);
                    }
                }
                Node::Comment(text) => {
                    self.out.push_str("<!-- ");
                    self.out.push_str(text);
                    self.out.push_str(" -->");
                }
                Node::Include { .. } => {}
            }
        }
    }

    /// Body of a raw-text element: text, raw blocks and markup joined
    /// verbatim. Nested elements and comments are written as in `pre`.
    fn raw_body(&mut self, nodes: &[Node]) -> String {
        let outer = std::mem::take(&mut self.out);
        for node in nodes {
            if !self.out.is_empty() && !self.out.ends_with('\n') {
                self.out.push('\n');
            }
            match node {
                Node::Text(s) | Node::RawBlock(s) | Node::Markup(s) => self.out.push_str(s),
                other => self.preformatted(std::slice::from_ref(other)),
            }
        }
        std::mem::replace(&mut self.out, outer)
    }

    fn open_tag(&mut self, el: &Element) {
        self.out.push('<');
        self.out.push_str(&el.head);
        for (key, value) in el.attributes() {
            self.out.push(' ');
            self.out.push_str(&key);
            if let Some(value) = value {
                self.out.push_str("=\"");
                self.out.push_str(&escape_attribute(&value));
                self.out.push('"');
            }
        }
        self.out.push('>');
    }

    fn close_tag(&mut self, el: &Element) {
        self.out.push_str("</");
        self.out.push_str(&el.head);
        self.out.push('>');
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn render(children: Vec<Node>) -> String {
        serialize(&Element::root(children, 0..0), &SerializeOptions::default())
    }

    fn el(head: &str, children: Vec<Node>) -> Node {
        Node::Element(Element::new(head).with_children(children))
    }

    #[test]
    fn tag_classes() {
        assert_eq!(TagClass::of("BR"), TagClass::InlineVoid);
        assert_eq!(TagClass::of("meta"), TagClass::Void);
        assert_eq!(TagClass::of("span"), TagClass::Inline);
        assert_eq!(TagClass::of("title"), TagClass::SingleLine);
        assert_eq!(TagClass::of("Style"), TagClass::RawText);
        assert_eq!(TagClass::of("pre"), TagClass::Preformatted);
        assert_eq!(TagClass::of("section"), TagClass::Block);
    }

    #[test]
    fn block_closes_inline_when_children_stay_on_one_line() {
        let html = render(vec![el("p", vec![Node::text("a "), el("b", vec![Node::text("x")])])]);
        assert_eq!(html, "<p>a <b>x</b></p>\n");
    }

    #[test]
    fn nested_blocks_indent() {
        let html = render(vec![el(
            "html",
            vec![el("body", vec![el("div", vec![Node::text("hi")])])],
        )]);
        assert_eq!(html, "<html>\n  <body>\n    <div>hi</div>\n  </body>\n</html>\n");
    }

    #[test]
    fn attributes_render_in_merged_order() {
        let node = Node::Element(
            Element::new("a")
                .with_attribute("href", Some("/x?a=1&b=\"2\"".into()))
                .with_attribute("download", None)
                .with_child(Node::text("go")),
        );
        assert_eq!(
            render(vec![node]),
            "<a href=\"/x?a=1&amp;b=&quot;2&quot;\" download>go</a>\n"
        );
    }

    #[test]
    fn text_is_escaped_and_markup_is_not() {
        let html = render(vec![el(
            "div",
            vec![Node::text("1 < 2 & 3"), Node::Markup("<i>ok</i>".into())],
        )]);
        assert_eq!(html, "<div>1 &lt; 2 &amp; 3<i>ok</i></div>\n");
    }

    #[test]
    fn void_elements_have_no_close_tag() {
        let meta = Node::Element(Element::new("meta").with_attribute("charset", Some("utf-8".into())));
        let html = render(vec![el("head", vec![meta]), el("p", vec![Node::text("a"), el("br", vec![]), Node::text("b")])]);
        assert_eq!(html, "<head>\n  <meta charset=\"utf-8\">\n</head>\n<p>a<br>b</p>\n");
    }

    #[test]
    fn raw_text_is_reindented() {
        let html = render(vec![el(
            "head",
            vec![el("style", vec![Node::RawBlock("\n\t\tp { color: red; }\n\t\t  b { }\n".into())])],
        )]);
        assert_eq!(
            html,
            "<head>\n  <style>\n    p { color: red; }\n      b { }\n  </style>\n</head>\n"
        );
    }

    #[test]
    fn raw_text_keeps_nested_elements() {
        let html = render(vec![el(
            "script",
            vec![
                Node::text("let a = 1;"),
                el("b", vec![Node::text("x")]),
                Node::Comment("c".into()),
            ],
        )]);
        assert_eq!(html, "<script>\n  let a = 1;\n  <b>x</b>\n  <!-- c -->\n</script>\n");
    }

    #[test]
    fn preformatted_is_escaped_in_place() {
        let html = render(vec![el("pre", vec![Node::RawBlock("  a < b\n    c".into())])]);
        assert_eq!(html, "<pre>  a &lt; b\n    c</pre>\n");
    }

    #[test]
    fn doctype_comment_and_title() {
        let html = render(vec![
            Node::Element(Element::new("!DOCTYPE").with_child(Node::text("html"))),
            Node::Comment("--> X <!--".into()),
            el("head", vec![el("title", vec![Node::text("T")])]),
        ]);
        assert_eq!(
            html,
            "<!DOCTYPE html>\n<!-- --> X <!-- -->\n<head>\n  <title>T</title>\n</head>\n"
        );
    }

    #[test]
    fn text_after_a_block_child_is_indented() {
        let html = render(vec![el("div", vec![el("p", vec![Node::text("x")]), Node::text("tail")])]);
        assert_eq!(html, "<div>\n  <p>x</p>\n  tail\n</div>\n");
    }

    #[test]
    fn empty_document_renders_nothing() {
        assert_eq!(render(vec![]), "");
    }
}
