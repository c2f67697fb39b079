use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use interpreter::SerializeOptions;
use interpreter::script::SubprocessRunner;
use serde::Deserialize;

/// Settings read from a `--config` TOML file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Columns per tab when reindenting code and raw-text bodies.
    pub tab_width: Option<usize>,
    /// Spaces per nesting level in the output.
    pub indent_width: Option<usize>,
    /// Kill `$<lang>` subprocesses that run longer than this.
    pub subprocess_timeout_secs: Option<u64>,
    /// Extra or replacement subprocess commands: `name = ["argv0", "arg"]`.
    pub languages: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Output options, with command-line values taking precedence.
    pub fn serialize_options(
        &self,
        tab_width: Option<usize>,
        indent_width: Option<usize>,
    ) -> SerializeOptions {
        let defaults = SerializeOptions::default();
        SerializeOptions {
            tab_width: tab_width.or(self.tab_width).unwrap_or(defaults.tab_width),
            indent_width: indent_width
                .or(self.indent_width)
                .unwrap_or(defaults.indent_width),
        }
    }

    pub fn runner(&self) -> SubprocessRunner {
        let mut runner = SubprocessRunner::default()
            .with_timeout(self.subprocess_timeout_secs.map(Duration::from_secs));
        for (language, argv) in &self.languages {
            runner = runner.with_command(language, argv.clone());
        }
        runner
    }
}
