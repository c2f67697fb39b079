use indexmap::IndexMap;

use crate::ruby::Dictionary;
use crate::script::{RhaiHost, ScriptError, ScriptHost, SubprocessError, SubprocessRunner};

/// State threaded through one document render: the in-process namespace,
/// the subprocess command table, `$pylocal` values and the ruby dictionary.
///
/// Nothing here survives the render that owns it.
pub struct Environment {
    host: Box<dyn ScriptHost>,
    runner: SubprocessRunner,
    locals: IndexMap<String, String>,
    dictionary: Dictionary,
}

impl Environment {
    pub fn new() -> Self {
        Self::with_parts(Box::new(RhaiHost::new()), SubprocessRunner::default())
    }

    pub fn with_parts(host: Box<dyn ScriptHost>, runner: SubprocessRunner) -> Self {
        Environment {
            host,
            runner,
            locals: IndexMap::new(),
            dictionary: Dictionary::new(),
        }
    }

    pub fn with_runner(mut self, runner: SubprocessRunner) -> Self {
        self.runner = runner;
        self
    }

    // ---- Scripting ----

    pub fn host_accepts(&self, language: &str) -> bool {
        self.host.accepts(language)
    }

    pub fn host_language(&self) -> &str {
        self.host.language()
    }

    pub fn eval(&mut self, code: &str) -> Result<Option<String>, ScriptError> {
        tracing::debug!(language = self.host.language(), "eval");
        self.host.eval(code)
    }

    pub fn exec(&mut self, code: &str) -> Result<(), ScriptError> {
        tracing::debug!(language = self.host.language(), "exec");
        self.host.exec(code)
    }

    pub fn is_truthy(&self, name: &str) -> bool {
        self.host.is_truthy(name)
    }

    pub fn runner_accepts(&self, language: &str) -> bool {
        self.runner.accepts(language)
    }

    pub fn run_subprocess(&self, language: &str, code: &str) -> Result<String, SubprocessError> {
        self.runner.run(language, code)
    }

    // ---- Local variables ----

    /// Store a local and publish it to the in-process namespace.
    pub fn set_local(&mut self, name: &str, value: &str) {
        self.host.bind(name, value);
        self.locals.insert(name.to_string(), value.to_string());
    }

    pub fn local(&self, name: &str) -> Option<&str> {
        self.locals.get(name).map(String::as_str)
    }

    // ---- Ruby ----

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn dictionary_mut(&mut self) -> &mut Dictionary {
        &mut self.dictionary
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
