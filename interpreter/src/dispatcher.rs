//! Directive dispatch: walks the parsed tree in document order, evaluates
//! directives against the environment and returns a tree of plain elements,
//! text, comments and markup ready for serialization.

use std::ops::Range;

use sx::node::{AttributeGroup, Element, Node};

use crate::control_flow::Flow;
use crate::environment::Environment;
use crate::error::{DiagnosticError, RuntimeError};
use crate::ruby::{annotation_skipped, ruby_element};
use crate::text::reindent;

const LOCALS_HEAD: &str = "$pylocal";

/// What a list head asks the dispatcher to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'a> {
    /// An ordinary tag.
    Literal,
    /// `@<lang>`: evaluate children in the shared namespace.
    InProcess(&'a str),
    /// `$<lang>`: evaluate children in a fresh subprocess.
    Subprocess(&'a str),
    /// `$pylocal`: store or read local variables.
    Locals,
    Flow(Flow),
    /// `#ruby`: register dictionary entries, emit nothing.
    RubyRegister,
    /// `@ruby`: annotate the given text.
    Ruby,
    /// `$ruby`: annotate the resolved children from the dictionary.
    RubyAuto,
}

impl<'a> Directive<'a> {
    pub fn classify(head: &'a str) -> Self {
        let lower = head.to_ascii_lowercase();
        match lower.as_str() {
            "@while" => return Directive::Flow(Flow::While),
            "@when" => return Directive::Flow(Flow::When),
            "@unless" => return Directive::Flow(Flow::Unless),
            "#ruby" => return Directive::RubyRegister,
            "@ruby" => return Directive::Ruby,
            "$ruby" => return Directive::RubyAuto,
            LOCALS_HEAD => return Directive::Locals,
            _ => {}
        }
        match head.split_at_checked(1) {
            Some(("@", lang)) if !lang.is_empty() => Directive::InProcess(lang),
            Some(("$", lang)) if !lang.is_empty() => Directive::Subprocess(lang),
            _ => Directive::Literal,
        }
    }
}

pub struct Dispatcher<'env> {
    env: &'env mut Environment,
    source_id: usize,
    tab_width: usize,
    diagnostics: Vec<DiagnosticError>,
    /// Innermost `$ruby` context; `None` while inside an element whose text
    /// is never annotated.
    auto_ruby: Vec<Option<Vec<AttributeGroup>>>,
}

impl<'env> Dispatcher<'env> {
    pub fn new(env: &'env mut Environment, source_id: usize, tab_width: usize) -> Self {
        Dispatcher {
            env,
            source_id,
            tab_width,
            diagnostics: Vec::new(),
            auto_ruby: Vec::new(),
        }
    }

    /// Warnings collected so far.
    pub fn into_diagnostics(self) -> Vec<DiagnosticError> {
        self.diagnostics
    }

    /// Resolve the document root into a directive-free root element.
    pub fn resolve_root(&mut self, root: &Element) -> Result<Element, DiagnosticError> {
        let children = self.resolve_nodes(&root.children)?;
        Ok(Element::root(children, root.span.clone()))
    }

    pub fn resolve_nodes(&mut self, nodes: &[Node]) -> Result<Vec<Node>, DiagnosticError> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            self.resolve_node(node, &mut out)?;
        }
        Ok(out)
    }

    fn resolve_node(&mut self, node: &Node, out: &mut Vec<Node>) -> Result<(), DiagnosticError> {
        match node {
            Node::Element(el) => self.resolve_element(el, out),
            Node::Include { path, span } => {
                Err(self.error(RuntimeError::UnresolvedInclude(path.clone()), span))
            }
            Node::Text(text) => {
                self.emit_text(text.clone(), out);
                Ok(())
            }
            other => {
                out.push(other.clone());
                Ok(())
            }
        }
    }

    pub(crate) fn resolve_element(
        &mut self,
        el: &Element,
        out: &mut Vec<Node>,
    ) -> Result<(), DiagnosticError> {
        let directive = Directive::classify(&el.head);
        if directive != Directive::Literal {
            tracing::debug!(head = %el.head, span = ?el.span, "directive");
        }
        match directive {
            Directive::Literal => {
                let children = if annotation_skipped(&el.head) {
                    self.with_auto_ruby(None, |d| d.resolve_nodes(&el.children))?
                } else {
                    self.resolve_nodes(&el.children)?
                };
                out.push(Node::Element(Element {
                    head: el.head.clone(),
                    groups: el.groups.clone(),
                    children,
                    span: el.span.clone(),
                }));
                Ok(())
            }
            Directive::InProcess(lang) => self.eval_in_process(el, lang, out),
            Directive::Subprocess(lang) => self.eval_subprocess(el, lang, out),
            Directive::Locals => self.locals(el, out),
            Directive::Flow(flow) => self.expand_flow(el, flow, out),
            Directive::RubyRegister => self.ruby_register(el),
            Directive::Ruby => self.ruby(el, out),
            Directive::RubyAuto => self.ruby_auto(el, out),
        }
    }

    // ---- Diagnostics ----

    pub(crate) fn error(&self, error: impl Into<RuntimeError>, span: &Range<usize>) -> DiagnosticError {
        DiagnosticError::new(error.into(), span.clone(), self.source_id)
    }

    fn warn(&mut self, message: String, span: &Range<usize>) {
        tracing::warn!(span = ?span, "{}", message);
        self.diagnostics
            .push(DiagnosticError::warning(message, span.clone(), self.source_id));
    }

    // ---- Scripting ----

    fn prepare(&self, code: &str) -> String {
        reindent("", code, self.tab_width)
    }

    /// Run code for its side effects in the shared namespace.
    pub(crate) fn exec(&mut self, code: &str, span: &Range<usize>) -> Result<(), DiagnosticError> {
        let code = self.prepare(code);
        self.env.exec(&code).map_err(|e| self.error(e, span))
    }

    pub(crate) fn is_truthy(&self, name: &str) -> bool {
        self.env.is_truthy(name)
    }

    fn eval_in_process(
        &mut self,
        el: &Element,
        language: &str,
        out: &mut Vec<Node>,
    ) -> Result<(), DiagnosticError> {
        if !self.env.host_accepts(language) {
            return Err(self.error(
                RuntimeError::UnknownLanguage {
                    mode: "in-process",
                    language: language.to_string(),
                },
                &el.span,
            ));
        }
        for child in &el.children {
            match child {
                Node::Text(code) | Node::RawBlock(code) => {
                    let code = self.prepare(code);
                    let result = self.env.eval(&code).map_err(|e| self.error(e, &el.span))?;
                    if let Some(html) = result {
                        out.push(Node::Markup(html));
                    }
                }
                other => self.resolve_node(other, out)?,
            }
        }
        Ok(())
    }

    fn eval_subprocess(
        &mut self,
        el: &Element,
        language: &str,
        out: &mut Vec<Node>,
    ) -> Result<(), DiagnosticError> {
        if !self.env.runner_accepts(language) {
            return Err(self.error(
                RuntimeError::UnknownLanguage {
                    mode: "subprocess",
                    language: language.to_string(),
                },
                &el.span,
            ));
        }
        for child in &el.children {
            match child {
                Node::Text(code) | Node::RawBlock(code) => {
                    let code = self.prepare(code);
                    let stdout = self
                        .env
                        .run_subprocess(language, &code)
                        .map_err(|e| self.error(e, &el.span))?;
                    if !stdout.is_empty() {
                        out.push(Node::Markup(stdout));
                    }
                }
                other => self.resolve_node(other, out)?,
            }
        }
        Ok(())
    }

    fn locals(&mut self, el: &Element, out: &mut Vec<Node>) -> Result<(), DiagnosticError> {
        for item in el.groups.iter().flat_map(|g| &g.items) {
            match &item.value {
                Some(value) => self.env.set_local(&item.key, value),
                None => match self.env.local(&item.key) {
                    Some(value) => self.emit_text(value.to_string(), out),
                    None => self.warn(
                        format!("{} variable '{}' is not set", LOCALS_HEAD, item.key),
                        &el.span,
                    ),
                },
            }
        }
        Ok(())
    }

    // ---- Ruby ----

    fn ruby(&mut self, el: &Element, out: &mut Vec<Node>) -> Result<(), DiagnosticError> {
        let mut parts = Vec::new();
        for child in &el.children {
            match child {
                Node::Text(text) => {
                    let resolved = self
                        .env
                        .dictionary_mut()
                        .resolve(text)
                        .map_err(|e| self.error(e, &el.span))?;
                    match resolved {
                        Some(entry) => parts.extend(entry.markup()),
                        None => {
                            self.warn(format!("no ruby reading registered for '{}'", text.trim()), &el.span);
                            parts.push(Node::text(text.trim()));
                        }
                    }
                }
                other => {
                    self.with_auto_ruby(None, |d| d.resolve_node(other, &mut parts))?;
                }
            }
        }
        if !parts.is_empty() {
            out.push(Node::Element(ruby_element(&el.groups, parts)));
        }
        Ok(())
    }

    fn ruby_register(&mut self, el: &Element) -> Result<(), DiagnosticError> {
        for child in &el.children {
            match child {
                Node::Text(text) | Node::RawBlock(text) => {
                    let count = self
                        .env
                        .dictionary_mut()
                        .load(text)
                        .map_err(|e| self.error(e, &el.span))?;
                    tracing::debug!(count, "dictionary text loaded");
                }
                Node::Element(inner) if inner.is("@ruby") => {
                    for text in inner.children.iter().filter_map(|c| match c {
                        Node::Text(t) => Some(t),
                        _ => None,
                    }) {
                        let resolved = self
                            .env
                            .dictionary_mut()
                            .resolve(text)
                            .map_err(|e| self.error(e, &inner.span))?;
                        if resolved.is_none() {
                            self.warn(format!("no ruby reading registered for '{}'", text.trim()), &inner.span);
                        }
                    }
                }
                other => {
                    // evaluated for side effects; output is discarded
                    let mut sink = Vec::new();
                    self.resolve_node(other, &mut sink)?;
                }
            }
        }
        Ok(())
    }

    /// Text is annotated as it is emitted, so only entries registered earlier
    /// in document order apply.
    fn ruby_auto(&mut self, el: &Element, out: &mut Vec<Node>) -> Result<(), DiagnosticError> {
        let resolved =
            self.with_auto_ruby(Some(el.groups.clone()), |d| d.resolve_nodes(&el.children))?;
        out.extend(resolved);
        Ok(())
    }

    fn with_auto_ruby<T>(
        &mut self,
        context: Option<Vec<AttributeGroup>>,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        self.auto_ruby.push(context);
        let result = f(self);
        self.auto_ruby.pop();
        result
    }

    fn emit_text(&self, text: String, out: &mut Vec<Node>) {
        match self.auto_ruby.last() {
            Some(Some(groups)) => out.extend(self.env.dictionary().annotate(&text, groups)),
            _ => out.push(Node::Text(text)),
        }
    }
}
