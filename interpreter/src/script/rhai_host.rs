use std::collections::HashSet;

use rhai::{AST, Array, Dynamic, Engine, Map, Scope};

use super::{RESULT_VARIABLE, ScriptError, ScriptHost};

const LANGUAGE: &str = "rhai";
const ALIASES: &[&str] = &["script"];

/// In-process host backed by the rhai engine.
///
/// Top-level variables live in one `Scope` for the whole document. Functions
/// cannot be stored in a scope, so every snippet's function definitions are
/// folded into `library`, which is merged in front of each later snippet.
pub struct RhaiHost {
    engine: Engine,
    scope: Scope<'static>,
    library: AST,
}

impl RhaiHost {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        // stdout belongs to the rendered document
        engine.on_print(|text| tracing::info!(target: "sx::script", "{}", text));
        engine.on_debug(|text, source, pos| {
            tracing::debug!(target: "sx::script", ?source, %pos, "{}", text)
        });

        RhaiHost {
            engine,
            scope: Scope::new(),
            library: AST::empty(),
        }
    }

    fn run(&mut self, code: &str) -> Result<(), ScriptError> {
        let ast = self
            .engine
            .compile(code)
            .map_err(|e| ScriptError::new(LANGUAGE, e.to_string()))?;
        let program = self.library.merge(&ast);
        self.engine
            .run_ast_with_scope(&mut self.scope, &program)
            .map_err(|e| ScriptError::new(LANGUAGE, e.to_string()))?;
        self.library = self.library.merge(&ast.clone_functions_only());
        self.compact_scope();
        Ok(())
    }

    /// Each top-level `let` pushes a new entry that shadows any earlier one of
    /// the same name, so a snippet repeated by `@while` would grow the scope on
    /// every pass. Keep only the visible entry per name.
    fn compact_scope(&mut self) {
        let entries: Vec<(String, bool, Dynamic)> = self
            .scope
            .iter_raw()
            .map(|(name, constant, value)| (name.to_string(), constant, value.clone()))
            .collect();
        let mut seen = HashSet::new();
        let mut visible: Vec<_> = entries
            .into_iter()
            .rev()
            .filter(|(name, _, _)| seen.insert(name.clone()))
            .collect();
        if visible.len() == self.scope.len() {
            return;
        }
        visible.reverse();
        self.scope.clear();
        for (name, constant, value) in visible {
            if constant {
                self.scope.push_constant_dynamic(name, value);
            } else {
                self.scope.push_dynamic(name, value);
            }
        }
    }
}

impl Default for RhaiHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptHost for RhaiHost {
    fn language(&self) -> &str {
        LANGUAGE
    }

    fn aliases(&self) -> &[&str] {
        ALIASES
    }

    fn eval(&mut self, code: &str) -> Result<Option<String>, ScriptError> {
        self.scope.set_value(RESULT_VARIABLE, ());
        self.run(code)?;
        Ok(self
            .scope
            .get_value::<Dynamic>(RESULT_VARIABLE)
            .filter(|value| !value.is_unit())
            .map(|value| value.to_string()))
    }

    fn exec(&mut self, code: &str) -> Result<(), ScriptError> {
        self.run(code)
    }

    fn is_truthy(&self, name: &str) -> bool {
        self.scope
            .get_value::<Dynamic>(name)
            .is_some_and(|value| truthy(&value))
    }

    fn bind(&mut self, name: &str, value: &str) {
        self.scope.set_value(name.to_string(), value.to_string());
    }
}

fn truthy(value: &Dynamic) -> bool {
    if value.is_unit() {
        return false;
    }
    if let Ok(b) = value.as_bool() {
        return b;
    }
    if let Ok(n) = value.as_int() {
        return n != 0;
    }
    if let Ok(f) = value.as_float() {
        return f != 0.0;
    }
    if value.is_string() {
        return value
            .clone()
            .into_immutable_string()
            .is_ok_and(|s| !s.is_empty());
    }
    if value.is_array() {
        return value.clone().try_cast::<Array>().is_some_and(|a| !a.is_empty());
    }
    if value.is_map() {
        return value.clone().try_cast::<Map>().is_some_and(|m| !m.is_empty());
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_variable_is_returned_and_reset() {
        let mut host = RhaiHost::new();
        assert_eq!(host.eval("HTML = \"<b>x</b>\";").unwrap().as_deref(), Some("<b>x</b>"));
        assert_eq!(host.eval("let unused = 1;").unwrap(), None);
        assert_eq!(host.eval("HTML = 6 * 7;").unwrap().as_deref(), Some("42"));
    }

    #[test]
    fn variables_persist_between_snippets() {
        let mut host = RhaiHost::new();
        host.exec("let n = 2;").unwrap();
        host.exec("n += 3;").unwrap();
        assert_eq!(host.eval("HTML = n;").unwrap().as_deref(), Some("5"));
    }

    #[test]
    fn repeated_let_does_not_grow_the_scope() {
        let mut host = RhaiHost::new();
        host.exec("let n = 0; const LIMIT = 3;").unwrap();
        for _ in 0..50 {
            host.exec("let n = n + 1; let more = n < LIMIT;").unwrap();
        }
        assert_eq!(host.scope.len(), 3);
        assert_eq!(host.eval("HTML = n;").unwrap().as_deref(), Some("50"));
        assert!(!host.is_truthy("more"));
        assert!(host.exec("LIMIT = 4;").is_err());
    }

    #[test]
    fn functions_persist_between_snippets() {
        let mut host = RhaiHost::new();
        host.exec("fn double(x) { x * 2 }").unwrap();
        assert_eq!(host.eval("HTML = double(21);").unwrap().as_deref(), Some("42"));
        host.exec("fn double(x) { x * 3 }").unwrap();
        assert_eq!(host.eval("HTML = double(2);").unwrap().as_deref(), Some("6"));
    }

    #[test]
    fn failed_snippet_reports_language() {
        let mut host = RhaiHost::new();
        let err = host.exec("let = ;").unwrap_err();
        assert_eq!(err.language, "rhai");
        assert!(host.eval("HTML = undefined_name;").is_err());
    }

    #[test]
    fn truthiness() {
        let mut host = RhaiHost::new();
        host.exec(
            "let t = true; let f = false; let zero = 0; let one = 1; \
             let empty = \"\"; let word = \"x\"; let none = (); \
             let list = []; let full = [1]; let half = 0.5;",
        )
        .unwrap();
        for name in ["t", "one", "word", "full", "half"] {
            assert!(host.is_truthy(name), "{} should be truthy", name);
        }
        for name in ["f", "zero", "empty", "none", "list", "missing"] {
            assert!(!host.is_truthy(name), "{} should be falsy", name);
        }
    }

    #[test]
    fn bound_values_are_strings() {
        let mut host = RhaiHost::new();
        host.bind("greeting", "hello");
        assert_eq!(
            host.eval("HTML = greeting + \" world\";").unwrap().as_deref(),
            Some("hello world")
        );
        assert!(host.accepts("RHAI") && host.accepts("script") && !host.accepts("python"));
    }
}
