//! `sx2html test`: runs `.test.sx` files.
//!
//! A test file is TOML frontmatter between `---` lines followed by the sx
//! source. Includes resolve relative to the test file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use interpreter::{CompileError, DiagnosticError, Environment, SerializeOptions};
use serde::Deserialize;
use sx::include::FsLoader;

const TEST_SUFFIX: &str = ".test.sx";
const FRONTMATTER_FENCE: &str = "---";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectedWarning {
    /// Substring that must appear in the warning message.
    pub contains: String,

    /// If set, the warning's span must start on this 1-based source line.
    #[serde(default)]
    pub line: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestConfig {
    /// Human-readable test description.
    pub description: Option<String>,

    /// Expected HTML, compared with surrounding whitespace trimmed.
    pub expect_output: Option<String>,

    /// The compile error's message must contain this substring.
    pub expect_error: Option<String>,

    /// The source must fail to parse.
    pub expect_parse_error: bool,

    /// If present (even empty), warning count and content are checked.
    pub expect_warnings: Option<Vec<ExpectedWarning>>,
}

/// Split a test file into its config and sx source.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');
    let body = content
        .strip_prefix(FRONTMATTER_FENCE)
        .ok_or("missing opening --- frontmatter delimiter")?;
    let body = body
        .strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(body);

    let (frontmatter, rest) = if let Some(rest) = body.strip_prefix(FRONTMATTER_FENCE) {
        ("", rest)
    } else {
        let close = body
            .find("\n---")
            .ok_or("missing closing --- frontmatter delimiter")?;
        (&body[..close], &body[close + 4..])
    };
    let source = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let config = toml::from_str(frontmatter.trim_end_matches('\r'))
        .map_err(|e| format!("TOML parse error: {}", e))?;
    Ok((config, source))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

impl TestResult {
    fn label(&self) -> &str {
        self.description.as_deref().unwrap_or_else(|| {
            self.path
                .file_name()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_suffix(TEST_SUFFIX))
                .unwrap_or("?")
        })
    }
}

fn run_single_test(path: &Path) -> TestResult {
    let mut description = None;
    let outcome = match std::fs::read_to_string(path) {
        Err(e) => TestOutcome::Fail(format!("cannot read file: {}", e)),
        Ok(content) => match parse_test_file(&content) {
            Err(e) => TestOutcome::Fail(format!("frontmatter error: {}", e)),
            Ok((config, source)) => {
                description = config.description.clone();
                match check(path, &config, source) {
                    Ok(()) => TestOutcome::Pass,
                    Err(reason) => TestOutcome::Fail(reason),
                }
            }
        },
    };
    TestResult {
        path: path.to_path_buf(),
        description,
        outcome,
    }
}

/// Compile `source` and compare against the expectations.
fn check(path: &Path, config: &TestConfig, source: &str) -> Result<(), String> {
    let loader = FsLoader::for_source(path);
    let mut env = Environment::new();
    let result = interpreter::compile(source, 0, &loader, &mut env, &SerializeOptions::default());

    if config.expect_parse_error {
        return match result {
            Err(CompileError::Parse(_)) => Ok(()),
            Err(other) => Err(format!("expected parse error, got: {}", other)),
            Ok(_) => Err("expected parse error, but parsing succeeded".into()),
        };
    }

    let (html, warnings) = match (result, &config.expect_error) {
        (Err(error), Some(expected)) => {
            let message = error.to_string();
            return if message.contains(expected.as_str()) {
                Ok(())
            } else {
                Err(format!(
                    "expected error containing \"{}\", got: {}",
                    expected, message
                ))
            };
        }
        (Ok(_), Some(expected)) => {
            return Err(format!(
                "expected error containing \"{}\", but compilation succeeded",
                expected
            ));
        }
        (Err(CompileError::Parse(error)), None) => {
            return Err(format!("unexpected parse error: {}", error));
        }
        (Err(error), None) => return Err(format!("unexpected error: {}", error)),
        (Ok(pair), None) => pair,
    };

    if let Some(expected) = &config.expect_output {
        let (expected, actual) = (expected.trim(), html.trim());
        if expected != actual {
            return Err(format!(
                "output mismatch\n  expected:\n{}\n  actual:\n{}",
                indent_block(expected),
                indent_block(actual)
            ));
        }
    }

    if let Some(expected) = &config.expect_warnings {
        check_warnings(source, &warnings, expected)?;
    }
    Ok(())
}

fn indent_block(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convert a byte offset in `source` to a 1-based line number.
fn byte_offset_to_line(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())]
        .bytes()
        .filter(|&b| b == b'\n')
        .count()
        + 1
}

fn check_warnings(
    source: &str,
    diagnostics: &[DiagnosticError],
    expected: &[ExpectedWarning],
) -> Result<(), String> {
    let actual: Vec<&DiagnosticError> = diagnostics.iter().filter(|d| d.is_warning).collect();

    if actual.len() != expected.len() {
        let listed = if actual.is_empty() {
            "    (none)".to_string()
        } else {
            actual
                .iter()
                .map(|w| format!("  - {}", w))
                .collect::<Vec<_>>()
                .join("\n")
        };
        return Err(format!(
            "expected {} warning(s), got {}\n  actual warnings:\n{}",
            expected.len(),
            actual.len(),
            listed
        ));
    }

    for (i, (warning, want)) in actual.iter().zip(expected).enumerate() {
        let message = warning.to_string();
        if !message.contains(&want.contains) {
            return Err(format!(
                "warning[{}]: expected message containing \"{}\", got: {}",
                i, want.contains, message
            ));
        }
        let Some(line) = want.line else { continue };
        match &warning.span {
            Some(span) if byte_offset_to_line(source, span.start) == line => {}
            Some(span) => {
                return Err(format!(
                    "warning[{}]: expected on line {}, but span is on line {}",
                    i,
                    line,
                    byte_offset_to_line(source, span.start)
                ));
            }
            None => {
                return Err(format!(
                    "warning[{}]: expected on line {}, but warning has no span",
                    i, line
                ));
            }
        }
    }
    Ok(())
}

// ---- Discovery ----

/// `.test.sx` files grouped by subfolder relative to `root`, sorted.
/// Files directly in `root` get category "".
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for path in entries.flatten().map(|entry| entry.path()) {
        if path.is_dir() {
            collect_tests(&path, root, out);
            continue;
        }
        let is_test = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(TEST_SUFFIX));
        if is_test {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

fn category_label(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return;
    }

    eprintln!("available categories:");
    for (category, files) in &categories {
        eprintln!("  {} ({} tests)", category_label(category), files.len());
    }
}

// ---- Reporting ----

struct Palette {
    color: bool,
}

impl Palette {
    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        } else {
            text.to_string()
        }
    }

    fn pass(&self) -> String {
        self.paint("32", "PASS")
    }

    fn fail(&self) -> String {
        self.paint("31", "FAIL")
    }

    fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }
}

#[derive(Default)]
struct Summary {
    passed: usize,
    failures: Vec<TestResult>,
}

impl Summary {
    fn record(&mut self, result: TestResult, palette: &Palette) {
        match result.outcome {
            TestOutcome::Pass => {
                self.passed += 1;
                eprintln!("  {}  {}", palette.pass(), result.label());
            }
            TestOutcome::Fail(_) => {
                eprintln!("  {}  {}", palette.fail(), result.label());
                self.failures.push(result);
            }
        }
    }

    /// Print failure details and the totals. Returns the exit code.
    fn finish(self, palette: &Palette) -> i32 {
        if !self.failures.is_empty() {
            eprintln!();
            eprintln!("failures:");
            for failure in &self.failures {
                eprintln!();
                eprintln!("  --- {} ---", failure.path.display());
                if let TestOutcome::Fail(reason) = &failure.outcome {
                    for line in reason.lines() {
                        eprintln!("  {}", line);
                    }
                }
            }
        }

        eprintln!();
        let failed = self.failures.len();
        if failed == 0 {
            eprintln!(
                "test result: {}. {} passed, 0 failed",
                palette.paint("32", "ok"),
                self.passed
            );
            0
        } else {
            eprintln!(
                "test result: {}. {} passed, {} failed (of {})",
                palette.paint("31", "FAILED"),
                self.passed,
                failed,
                self.passed + failed
            );
            1
        }
    }
}

/// Run every test under `path` (or the single file `path`), optionally only
/// the given categories. Returns the process exit code.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let palette = Palette { color: !no_color };
    let mut summary = Summary::default();

    if path.is_file() {
        summary.record(run_single_test(path), &palette);
        return summary.finish(&palette);
    }

    let all_categories = discover_categorized(path);
    if all_categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return 1;
    }

    let selected: BTreeMap<&str, &Vec<PathBuf>> = if categories.is_empty() {
        all_categories.iter().map(|(k, v)| (k.as_str(), v)).collect()
    } else {
        let mut filtered = BTreeMap::new();
        for requested in categories {
            let requested = requested.trim_matches('/');
            let prefix = format!("{}/", requested);
            let before = filtered.len();
            for (category, files) in &all_categories {
                if category == requested || category.starts_with(&prefix) {
                    filtered.insert(category.as_str(), files);
                }
            }
            if filtered.len() == before {
                eprintln!(
                    "warning: category '{}' not found (available: {})",
                    requested,
                    all_categories
                        .keys()
                        .map(|k| category_label(k))
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }
        filtered
    };

    if selected.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    for (category, files) in &selected {
        eprintln!();
        eprintln!("{}", palette.bold(category_label(category)));
        for file in *files {
            summary.record(run_single_test(file), &palette);
        }
    }

    summary.finish(&palette)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn frontmatter_and_source_are_split() {
        let (config, source) =
            parse_test_file("---\ndescription = \"d\"\nexpect_output = \"<p>x</p>\"\n---\n(p x)\n")
                .unwrap();
        assert_eq!(config.description.as_deref(), Some("d"));
        assert_eq!(config.expect_output.as_deref(), Some("<p>x</p>"));
        assert_eq!(source, "(p x)\n");

        let (config, source) = parse_test_file("---\n---\n(p)").unwrap();
        assert!(config.expect_output.is_none());
        assert_eq!(source, "(p)");

        assert!(parse_test_file("(p x)").is_err());
        assert!(parse_test_file("---\nexpect_output = 1\n").is_err());
    }

    #[test]
    fn expectations_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let pass = write(
            dir.path(),
            "ok.test.sx",
            "---\nexpect_output = \"<p>x</p>\"\nexpect_warnings = []\n---\n(p x)\n",
        );
        assert!(matches!(run_single_test(&pass).outcome, TestOutcome::Pass));

        let mismatch = write(dir.path(), "bad.test.sx", "---\nexpect_output = \"<p>y</p>\"\n---\n(p x)\n");
        assert!(matches!(run_single_test(&mismatch).outcome, TestOutcome::Fail(_)));

        let parse = write(dir.path(), "parse.test.sx", "---\nexpect_parse_error = true\n---\n(p\n");
        assert!(matches!(run_single_test(&parse).outcome, TestOutcome::Pass));

        let error = write(
            dir.path(),
            "err.test.sx",
            "---\nexpect_error = \"no in-process evaluator\"\n---\n(@cobol x)\n",
        );
        assert!(matches!(run_single_test(&error).outcome, TestOutcome::Pass));

        let warned = write(
            dir.path(),
            "warn.test.sx",
            "---\n[[expect_warnings]]\ncontains = \"no ruby reading\"\nline = 2\n---\n(p)\n(@ruby 未知)\n",
        );
        assert!(matches!(run_single_test(&warned).outcome, TestOutcome::Pass));
    }

    #[test]
    fn categories_follow_subfolders() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.test.sx", "---\n---\n");
        write(dir.path(), "ruby/b.test.sx", "---\n---\n");
        write(dir.path(), "ruby/notes.txt", "");
        let categories = discover_categorized(dir.path());
        let keys: Vec<_> = categories.keys().cloned().collect();
        assert_eq!(keys, vec!["".to_string(), "ruby".to_string()]);
        assert_eq!(categories["ruby"].len(), 1);
        assert_eq!(run_tests(dir.path(), true, &["ruby".to_string()]), 0);
    }
}
