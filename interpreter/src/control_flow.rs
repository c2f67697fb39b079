//! `@while`, `@when` and `@unless`.
//!
//! Shape: `(head [condition init...] [update...]... body...)`. The first group
//! names the condition variable and carries init code; each later group is a
//! list of update code run after the body.

use sx::node::{AttributeGroup, Element, Node};

use crate::dispatcher::Dispatcher;
use crate::error::{DiagnosticError, RuntimeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    While,
    When,
    Unless,
}

impl Flow {
    fn head(self) -> &'static str {
        match self {
            Flow::While => "@while",
            Flow::When => "@when",
            Flow::Unless => "@unless",
        }
    }
}

impl Dispatcher<'_> {
    pub(crate) fn expand_flow(
        &mut self,
        el: &Element,
        flow: Flow,
        out: &mut Vec<Node>,
    ) -> Result<(), DiagnosticError> {
        let Some((first, updates)) = el.groups.split_first() else {
            return Err(self.error(
                RuntimeError::malformed(flow.head(), "missing [condition init...] group"),
                &el.span,
            ));
        };
        let mut items = first.raw_items();
        let Some(condition) = items.next() else {
            return Err(self.error(
                RuntimeError::malformed(flow.head(), "missing condition variable"),
                &el.span,
            ));
        };

        for init in items {
            self.exec(init, &el.span)?;
        }

        match flow {
            Flow::While => {
                let mut iterations = 0usize;
                while self.is_truthy(condition) {
                    out.extend(self.resolve_nodes(&el.children)?);
                    self.run_updates(updates, el)?;
                    iterations += 1;
                }
                tracing::debug!(condition, iterations, "@while finished");
            }
            Flow::When | Flow::Unless => {
                let truthy = self.is_truthy(condition);
                if truthy == (flow == Flow::When) {
                    out.extend(self.resolve_nodes(&el.children)?);
                    self.run_updates(updates, el)?;
                }
            }
        }
        Ok(())
    }

    fn run_updates(&mut self, updates: &[AttributeGroup], el: &Element) -> Result<(), DiagnosticError> {
        for code in updates.iter().flat_map(|g| g.raw_items()) {
            self.exec(code, &el.span)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sx::parser::Parser;

    use super::*;
    use crate::environment::Environment;

    fn expand(source: &str) -> Result<Vec<Node>, DiagnosticError> {
        let doc = Parser::new(source.to_string(), 0).parse().unwrap();
        let mut env = Environment::new();
        let mut dispatcher = Dispatcher::new(&mut env, 0, 4);
        dispatcher.resolve_nodes(&doc.root.children)
    }

    fn texts(nodes: &[Node]) -> Vec<String> {
        nodes
            .iter()
            .map(|n| match n {
                Node::Markup(s) | Node::Text(s) => s.clone(),
                other => panic!("unexpected node {other:?}"),
            })
            .collect()
    }

    #[test]
    fn while_repeats_until_condition_is_false() {
        let nodes = expand(
            "(@while [more \"let n = 0; let more = true;\"][\"n += 1;\" \"more = n < 3;\"] \
             (@rhai \"HTML = n;\"))",
        )
        .unwrap();
        assert_eq!(texts(&nodes), vec!["0", "1", "2"]);
    }

    #[test]
    fn while_with_false_condition_emits_nothing() {
        let nodes = expand("(@while [more \"let more = false;\"] never)").unwrap();
        assert!(nodes.is_empty());
    }

    #[test]
    fn when_and_unless() {
        let nodes = expand(
            "(@when [yes \"let yes = 1;\"][\"yes = 0;\"] a) \
             (@when [yes] b) \
             (@unless [yes] c) \
             (@unless [missing] d)",
        )
        .unwrap();
        assert_eq!(texts(&nodes), vec!["a", "c", "d"]);
    }

    #[test]
    fn missing_condition_is_malformed() {
        let err = expand("(@while x)").unwrap_err();
        assert!(matches!(err.error, RuntimeError::MalformedDirective { .. }));
        assert_eq!(err.span, Some(0..10));

        let err = expand("(@when [] x)").unwrap_err();
        assert!(matches!(err.error, RuntimeError::MalformedDirective { .. }));
    }

    #[test]
    fn init_errors_stop_the_loop() {
        let err = expand("(@while [more \"let more = ;\"] x)").unwrap_err();
        assert!(matches!(err.error, RuntimeError::Script(_)));
    }
}
