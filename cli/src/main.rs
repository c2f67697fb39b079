mod config;
mod test_runner;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::EnvFilter;

use interpreter::{DiagnosticError, Environment};
use sx::include::{FsLoader, resolve_includes};

use config::Config;

const SUBCOMMANDS: &[&str] = &["run", "test", "help"];

/// Options of `run` that consume the following argument.
const VALUE_OPTIONS: &[&str] = &["-c", "--config", "--tab-width", "--indent"];

/// Stands for stdin or stdout.
const STDIO: &str = "-";

#[derive(Parser)]
#[command(name = "sx2html", version, about = "Compile sx markup to HTML")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log directive evaluation to stderr
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile an sx document to HTML
    Run(RunArgs),

    /// Run .test.sx test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Source file, `-` for stdin
    #[arg(default_value = STDIO)]
    input: String,

    /// Output file, `-` for stdout
    #[arg(default_value = STDIO)]
    output: String,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Columns per tab when reindenting code
    #[arg(long)]
    tab_width: Option<usize>,

    /// Spaces per nesting level in the output
    #[arg(long)]
    indent: Option<usize>,

    /// Parse only, don't evaluate (exit 0 if valid)
    #[arg(long)]
    check: bool,

    /// Dump the parsed tree
    #[arg(long)]
    ast: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.sx file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    let cli = Cli::parse_from(with_implied_run(std::env::args().collect()));
    init_tracing(cli.debug);

    match cli.command {
        Command::Run(run_args) => do_run(run_args, cli.no_color),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

/// `sx2html in.sx out.html` means `sx2html run in.sx out.html`, and a bare
/// `sx2html` filters stdin to stdout.
fn with_implied_run(mut args: Vec<String>) -> Vec<String> {
    let mut first_positional = None;
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        if VALUE_OPTIONS.contains(&arg.as_str()) {
            rest.next();
        } else if arg == STDIO || !arg.starts_with('-') {
            first_positional = Some(arg.as_str());
            break;
        }
    }
    let asks_for_info = args
        .iter()
        .any(|a| matches!(a.as_str(), "-h" | "--help" | "-V" | "--version"));

    let implied = match first_positional {
        Some(arg) => !SUBCOMMANDS.contains(&arg),
        None => !asks_for_info,
    };
    if implied {
        args.insert(1.min(args.len()), "run".to_string());
    }
    args
}

fn init_tracing(debug: bool) {
    // --debug enables DEBUG, otherwise use RUST_LOG or default to WARN
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn do_run(args: RunArgs, no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let writer = StandardStream::stderr(color_choice);
    let term_config = term::Config::default();

    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        },
        None => Config::default(),
    };
    let options = config.serialize_options(args.tab_width, args.indent);
    tracing::debug!(input = %args.input, ?options, "compiling");

    let source = match read_input(&args.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", args.input, e);
            process::exit(1);
        }
    };

    let display_name = if args.input == STDIO {
        "<stdin>".to_string()
    } else {
        args.input.clone()
    };
    let mut files = SimpleFiles::new();
    let file_id = files.add(display_name, source.clone());

    let mut document = match sx::parser::Parser::new(source, file_id).parse() {
        Ok(doc) => doc,
        Err(error) => {
            let _ = term::emit_to_write_style(
                &mut writer.lock(),
                &term_config,
                &files,
                &error.to_diagnostic(),
            );
            process::exit(1);
        }
    };

    // --check: parse succeeded, exit
    if args.check {
        eprintln!("ok: {} parsed successfully", args.input);
        return;
    }

    // --ast: dump tree
    if args.ast {
        println!("{:#?}", document.root);
        return;
    }

    let loader = if args.input == STDIO {
        FsLoader::new(".")
    } else {
        FsLoader::for_source(Path::new(&args.input))
    };
    match resolve_includes(&mut document, &loader) {
        Ok(loaded) => tracing::debug!(loaded, "includes resolved"),
        Err(error) => {
            let _ = term::emit_to_write_style(
                &mut writer.lock(),
                &term_config,
                &files,
                &error.to_diagnostic(),
            );
            process::exit(1);
        }
    }

    let mut env = Environment::new().with_runner(config.runner());
    let result = interpreter::render_document(&document, &mut env, &options);

    let html = match result {
        Ok((html, warnings)) => {
            emit_diagnostics(&writer, &term_config, &files, &warnings);
            html
        }
        Err(error) => {
            emit_diagnostic_error(&writer, &term_config, &files, &error);
            process::exit(1);
        }
    };

    if let Err(e) = write_output(&args.output, &html) {
        eprintln!("error: cannot write '{}': {}", args.output, e);
        process::exit(1);
    }
}

fn read_input(input: &str) -> io::Result<String> {
    if input == STDIO {
        let mut source = String::new();
        io::stdin().read_to_string(&mut source)?;
        Ok(source)
    } else {
        std::fs::read_to_string(input)
    }
}

fn write_output(output: &str, html: &str) -> io::Result<()> {
    if output == STDIO {
        let mut stdout = io::stdout().lock();
        stdout.write_all(html.as_bytes())?;
        stdout.flush()
    } else {
        std::fs::write(output, html)
    }
}

fn emit_diagnostic_error(
    writer: &StandardStream,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    error: &DiagnosticError,
) {
    if let Some(span) = &error.span {
        let severity = if error.is_warning {
            Severity::Warning
        } else {
            Severity::Error
        };
        let diagnostic = Diagnostic::new(severity)
            .with_message(error.to_string())
            .with_labels(vec![Label::primary(error.source_id, span.clone())]);
        let _ = term::emit_to_write_style(&mut writer.lock(), config, files, &diagnostic);
    } else {
        let prefix = if error.is_warning {
            "warning"
        } else {
            "runtime error"
        };
        eprintln!("{}: {}", prefix, error);
    }
}

fn emit_diagnostics(
    writer: &StandardStream,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    diagnostics: &[DiagnosticError],
) {
    for diag in diagnostics {
        emit_diagnostic_error(writer, config, files, diag);
    }
}
