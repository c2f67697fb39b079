//! Isolated evaluation: each snippet runs in a fresh child process that
//! receives the code on stdin and answers on stdout.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum SubprocessError {
    #[error("no subprocess command configured for language '{0}'")]
    UnknownLanguage(String),
    #[error("cannot start `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {}: {}", describe_exit(.exit_code), last_words(.stderr))]
    Failed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("`{command}` did not finish within {limit:?}")]
    Timeout { command: String, limit: Duration },
}

fn describe_exit(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

fn last_words(stderr: &str) -> &str {
    stderr.trim_end()
}

/// Language name to command table for `$<lang>` directives.
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    commands: IndexMap<String, Vec<String>>,
    timeout: Option<Duration>,
}

impl Default for SubprocessRunner {
    fn default() -> Self {
        let mut commands = IndexMap::new();
        commands.insert("python".to_string(), vec!["python3".to_string(), "-".to_string()]);
        commands.insert("sh".to_string(), vec!["sh".to_string(), "-s".to_string()]);
        SubprocessRunner {
            commands,
            timeout: None,
        }
    }
}

impl SubprocessRunner {
    /// A runner with no languages configured.
    pub fn empty() -> Self {
        SubprocessRunner {
            commands: IndexMap::new(),
            timeout: None,
        }
    }

    /// Add or replace the command for `language`. An empty argv removes it.
    pub fn with_command(mut self, language: &str, argv: Vec<String>) -> Self {
        let key = language.to_ascii_lowercase();
        if argv.is_empty() {
            self.commands.shift_remove(&key);
        } else {
            self.commands.insert(key, argv);
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn accepts(&self, language: &str) -> bool {
        self.commands.contains_key(&language.to_ascii_lowercase())
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Run `code` under the command for `language` and return its stdout.
    pub fn run(&self, language: &str, code: &str) -> Result<String, SubprocessError> {
        let argv = self
            .commands
            .get(&language.to_ascii_lowercase())
            .ok_or_else(|| SubprocessError::UnknownLanguage(language.to_string()))?;
        let command = argv.join(" ");
        let Some((program, args)) = argv.split_first() else {
            return Err(SubprocessError::UnknownLanguage(language.to_string()));
        };

        tracing::debug!(%command, bytes = code.len(), "spawning subprocess");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SubprocessError::Launch {
                command: command.clone(),
                source,
            })?;

        // Feed stdin and drain both pipes on their own threads so a chatty
        // child can never block on a full pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            let code = code.to_string();
            thread::spawn(move || {
                // a child that exits without reading stdin is judged by its status
                let _ = stdin.write_all(code.as_bytes());
            })
        });
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = self.wait(&mut child).map_err(|source| SubprocessError::Launch {
            command: command.clone(),
            source,
        })?;

        // A killed child may leave grandchildren holding the pipes, so the
        // reader threads are abandoned rather than joined.
        let Some(status) = status else {
            return Err(SubprocessError::Timeout {
                command,
                limit: self.timeout.unwrap_or_default(),
            });
        };

        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let stdout = collect(stdout);
        let stderr = collect(stderr);

        if status.success() {
            Ok(String::from_utf8_lossy(&stdout).into_owned())
        } else {
            Err(SubprocessError::Failed {
                command,
                exit_code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            })
        }
    }

    /// Wait for the child. `None` means it was killed after the timeout.
    fn wait(&self, child: &mut Child) -> io::Result<Option<ExitStatus>> {
        let Some(limit) = self.timeout else {
            return child.wait().map(Some);
        };
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if started.elapsed() >= limit {
                tracing::warn!(?limit, "subprocess timed out, killing it");
                let _ = child.kill();
                child.wait()?;
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn stdout_is_returned_verbatim() {
        let runner = SubprocessRunner::default();
        let out = runner.run("sh", "printf '<p>%s</p>' hi\n").unwrap();
        assert_eq!(out, "<p>hi</p>");
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        let runner = SubprocessRunner::default();
        let err = runner.run("sh", "echo broken >&2\nexit 3\n").unwrap_err();
        match err {
            SubprocessError::Failed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr.trim(), "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_language_and_missing_program() {
        let runner = SubprocessRunner::empty()
            .with_command("ghost", vec!["definitely-not-a-real-binary-sx".to_string()]);
        assert!(matches!(
            runner.run("perl", "print 1"),
            Err(SubprocessError::UnknownLanguage(lang)) if lang == "perl"
        ));
        assert!(matches!(
            runner.run("ghost", ""),
            Err(SubprocessError::Launch { .. })
        ));
    }

    #[test]
    fn timeout_kills_the_child() {
        let runner = SubprocessRunner::default().with_timeout(Some(Duration::from_millis(200)));
        let err = runner.run("sh", "exec sleep 5\n").unwrap_err();
        assert!(matches!(err, SubprocessError::Timeout { .. }));
    }

    #[test]
    fn each_run_is_isolated() {
        let runner = SubprocessRunner::default();
        runner.run("sh", "X=1\n").unwrap();
        assert_eq!(runner.run("sh", "printf '%s' \"${X:-unset}\"\n").unwrap(), "unset");
    }
}
