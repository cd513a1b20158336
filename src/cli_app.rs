//! Top-level CLI definition and dispatch.

use std::ffi::OsString;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use mailarchive_harness::archiver::process::ProcessLibrary;
use mailarchive_harness::core::config::Config;
use mailarchive_harness::core::errors::HarnessError;
use mailarchive_harness::corpus::collate::{CollatePolicy, collate_logged};
use mailarchive_harness::logger::jsonl::EventLog;
use mailarchive_harness::runner::golden::{self, GeneratorSpec, ParsingSpec};
use mailarchive_harness::runner::orchestrate::{self, OrchestrateOptions};
use mailarchive_harness::runner::outcome::{Reporter, RunTally};
use mailarchive_harness::runner::{RunOptions, Session, generators, parsing};

/// Mail Archive Harness: differential regression tests for a mailing-list archiver.
#[derive(Debug, Parser)]
#[command(
    name = "mah",
    author,
    version,
    about = "Mail Archive Harness - archiver regression testing",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Archiver binding command; repeat once per argv element.
    #[arg(long = "archiver", global = true, value_name = "ARG", allow_hyphen_values = true)]
    archiver: Vec<String>,
    /// Calling shape: `auto` or `<constructor>/<compute>[/<channel>]`.
    #[arg(long, global = true, value_name = "SHAPE")]
    shape: Option<String>,
    /// Append run events to this JSONL file.
    #[arg(long, global = true, value_name = "PATH")]
    log_jsonl: Option<PathBuf>,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Merge mbox files into one deduplicated, key-ordered mbox.
    Collate(CollateArgs),
    /// Generator-id regression tests.
    Generators(RunnerArgs),
    /// Body and attachment parsing regression tests.
    Parsing(RunnerArgs),
    /// Verify every section of every golden spec.
    RunAll(RunAllArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct CollateArgs {
    /// Output mbox path.
    output: PathBuf,
    /// Input mbox files, in priority order (later inputs win duplicates).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Drop messages without a Message-ID instead of keying them by date or subject.
    #[arg(long)]
    drop_missing_id: bool,
}

#[derive(Debug, Clone, Args)]
struct RunnerArgs {
    #[command(subcommand)]
    mode: RunnerMode,
}

#[derive(Debug, Clone, Subcommand)]
enum RunnerMode {
    /// Record a golden spec from the installed archiver.
    Generate(GenerateArgs),
    /// Compare the installed archiver against golden specs.
    Verify(VerifyArgs),
}

#[derive(Debug, Clone, Args)]
struct GenerateArgs {
    /// Spec file to write (overwritten).
    #[arg(long, value_name = "PATH")]
    output: PathBuf,
    /// Corpus mbox files.
    #[arg(long = "mbox", value_name = "PATH", required = true, num_args = 1..)]
    mbox: Vec<PathBuf>,
    /// Only record these generators (generator tests only).
    #[arg(long = "generator", value_name = "NAME")]
    generators: Vec<String>,
    /// Enable HTML parsing (parsing tests only).
    #[arg(long)]
    html: bool,
    /// List-ID override for every message.
    #[arg(long = "listid", value_name = "LID")]
    list_id: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct VerifyArgs {
    /// Spec files to verify.
    #[arg(long = "load", value_name = "PATH", required = true, num_args = 1..)]
    load: Vec<PathBuf>,
    /// List-ID override for every message.
    #[arg(long = "listid", value_name = "LID")]
    list_id: Option<String>,
    /// Stop after the first spec file with failures.
    #[arg(long)]
    fail_fast: bool,
}

#[derive(Debug, Clone, Args)]
struct RunAllArgs {
    /// Spec files to run instead of every spec in the spec directory.
    #[arg(long = "load", value_name = "PATH", num_args = 1..)]
    load: Vec<PathBuf>,
    /// Directory of `*.json` specs (default from config).
    #[arg(long, value_name = "DIR")]
    spec_dir: Option<PathBuf>,
    /// Stop after the first spec file with a failing section.
    #[arg(long)]
    fail_fast: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Generators,
    Parsing,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// The run completed but tests failed.
    #[error("{0}")]
    TestFailures(String),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) => 3,
            Self::TestFailures(_) => 4,
        }
    }
}

impl From<HarnessError> for CliError {
    fn from(err: HarnessError) -> Self {
        let msg = err.to_string();
        let fatal = err.is_fatal();
        match err {
            HarnessError::InvalidConfig { .. }
            | HarnessError::MissingConfig { .. }
            | HarnessError::ConfigParse { .. }
            | HarnessError::GoldenFormat { .. }
            | HarnessError::UnsupportedLibraryShape { .. }
            | HarnessError::MissingGenerator { .. } => Self::User(msg),
            HarnessError::Serialization { .. } => Self::Internal(msg),
            // Reported kinds that escape a runner are counted failures.
            _ if !fatal => Self::TestFailures(msg),
            _ => Self::Runtime(msg),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color || !io::stdout().is_terminal() {
        control::set_override(false);
    }

    if let Command::Completions(args) = &cli.command {
        let mut command = Cli::command();
        let binary_name = command.get_name().to_string();
        generate(args.shell, &mut command, binary_name, &mut io::stdout());
        return Ok(());
    }

    let config = load_config(cli)?;
    init_tracing(cli, &config);
    let mut log = EventLog::from_option(config.logging.jsonl_path.as_deref());

    let result = match &cli.command {
        Command::Collate(args) => run_collate(&config, args, &mut log),
        Command::Generators(args) => run_runner(&config, Variant::Generators, args, &mut log),
        Command::Parsing(args) => run_runner(&config, Variant::Parsing, args, &mut log),
        Command::RunAll(args) => run_all(cli, &config, args),
        Command::Completions(_) => Ok(()),
    };
    log.flush();
    result
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if !cli.archiver.is_empty() {
        config.archiver.command.clone_from(&cli.archiver);
    }
    if let Some(shape) = &cli.shape {
        config.archiver.shape.clone_from(shape);
        config.archiver.shape_selection()?;
    }
    if let Some(path) = &cli.log_jsonl {
        config.logging.jsonl_path = Some(path.clone());
    }
    Ok(config)
}

fn init_tracing(cli: &Cli, config: &Config) {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if cli.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_env("MAH_LOG")
            .or_else(|_| EnvFilter::try_new(&config.logging.level))
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run_collate(config: &Config, args: &CollateArgs, log: &mut EventLog) -> Result<(), CliError> {
    let policy = if args.drop_missing_id {
        CollatePolicy::DropMissingId
    } else {
        config.collate.missing_id
    };
    let counts = collate_logged(&args.output, &args.inputs, policy, log)?;
    println!("{}", counts.summary_line(&args.output));
    Ok(())
}

fn run_runner(
    config: &Config,
    variant: Variant,
    args: &RunnerArgs,
    log: &mut EventLog,
) -> Result<(), CliError> {
    let (list_id, fail_fast) = match &args.mode {
        RunnerMode::Generate(g) => (g.list_id.clone(), false),
        RunnerMode::Verify(v) => (v.list_id.clone(), v.fail_fast),
    };
    let options = RunOptions {
        selection: config.archiver.shape_selection()?,
        list_id: list_id.or_else(|| config.runner.list_id.clone()),
        fail_fast: fail_fast || config.runner.fail_fast,
    };

    let mut library = ProcessLibrary::spawn(
        config.archiver.require_command()?,
        config.archiver.working_dir.as_deref(),
    )?;
    let mut session = Session::new(&mut library, options, log);

    let stdout = io::stdout();
    let stderr = io::stderr();
    let mut out = stdout.lock();
    let mut err = stderr.lock();
    let mut reporter = Reporter::new(&mut out, &mut err);

    match &args.mode {
        RunnerMode::Generate(g) => run_generate(&mut session, variant, g, &mut reporter),
        RunnerMode::Verify(v) => run_verify(&mut session, variant, &v.load, &mut reporter),
    }
}

fn run_generate(
    session: &mut Session<'_>,
    variant: Variant,
    args: &GenerateArgs,
    reporter: &mut Reporter<'_>,
) -> Result<(), CliError> {
    let cmd = invocation();
    match variant {
        Variant::Generators => {
            let spec = generators::generate(session, &args.mbox, &args.generators, &cmd, reporter)?;
            session.write_spec("generators", &args.output, &spec)?;
        }
        Variant::Parsing => {
            let spec = parsing::generate(session, &args.mbox, args.html, &cmd, reporter)?;
            session.write_spec("parsing", &args.output, &spec)?;
        }
    }
    reporter.note(&format!("Wrote {}", args.output.display()))?;
    Ok(())
}

fn run_verify(
    session: &mut Session<'_>,
    variant: Variant,
    specs: &[PathBuf],
    reporter: &mut Reporter<'_>,
) -> Result<(), CliError> {
    let mut total = RunTally::default();
    for spec_path in specs {
        let tally = verify_one(session, variant, spec_path, reporter)?;
        total.merge(tally);
        if session.options.fail_fast && !tally.passed() {
            tracing::info!(spec = %spec_path.display(), "stopping after first failing spec");
            break;
        }
    }
    reporter.summary(&total)?;

    if total.passed() {
        Ok(())
    } else {
        Err(CliError::TestFailures(format!(
            "{} of {} tests failed",
            total.failed, total.tests_run
        )))
    }
}

fn verify_one(
    session: &mut Session<'_>,
    variant: Variant,
    spec_path: &Path,
    reporter: &mut Reporter<'_>,
) -> Result<RunTally, CliError> {
    let tally = match variant {
        Variant::Generators => {
            let spec: GeneratorSpec = golden::load(spec_path)?;
            generators::verify(session, spec_path, &spec, reporter)?
        }
        Variant::Parsing => {
            let spec: ParsingSpec = golden::load(spec_path)?;
            parsing::verify(session, spec_path, &spec, reporter)?
        }
    };
    Ok(tally)
}

fn run_all(cli: &Cli, config: &Config, args: &RunAllArgs) -> Result<(), CliError> {
    let spec_dir = args.spec_dir.as_ref().unwrap_or(&config.runner.spec_dir);
    let specs = orchestrate::spec_files(&args.load, spec_dir)?;
    if specs.is_empty() {
        return Err(CliError::User(format!(
            "no spec files given and none found in {}",
            spec_dir.display()
        )));
    }

    let program = std::env::current_exe()
        .map_err(|e| CliError::Runtime(format!("cannot locate the mah executable: {e}")))?;
    let options = OrchestrateOptions {
        program,
        base_args: passthrough_args(cli),
        fail_fast: args.fail_fast || config.runner.fail_fast,
    };

    let stdout = io::stdout();
    let stderr = io::stderr();
    let mut out = stdout.lock();
    let mut err = stderr.lock();
    let summary = {
        let mut reporter = Reporter::new(&mut out, &mut err);
        orchestrate::run_all(&options, &specs, &mut reporter)?
    };

    let verdict = format!("{} Were GOOD, {} were BAD", summary.good, summary.bad);
    let verdict = if summary.passed() {
        verdict.green()
    } else {
        verdict.red().bold()
    };
    let text = summary.to_string();
    for line in text.lines() {
        if line.contains("Were GOOD") {
            writeln!(out, "{verdict}")?;
        } else {
            writeln!(out, "{line}")?;
        }
    }
    out.flush()?;

    if summary.passed() {
        Ok(())
    } else {
        Err(CliError::TestFailures(format!(
            "{} of {} test sections failed",
            summary.bad, summary.sections
        )))
    }
}

/// Global flags to hand to child invocations.
fn passthrough_args(cli: &Cli) -> Vec<OsString> {
    let mut args = Vec::new();
    if let Some(config) = &cli.config {
        args.push("--config".into());
        args.push(config.into());
    }
    for arg in &cli.archiver {
        args.push(format!("--archiver={arg}").into());
    }
    if let Some(shape) = &cli.shape {
        args.push("--shape".into());
        args.push(shape.into());
    }
    if let Some(path) = &cli.log_jsonl {
        args.push("--log-jsonl".into());
        args.push(path.into());
    }
    if cli.no_color {
        args.push("--no-color".into());
    }
    if cli.verbose {
        args.push("--verbose".into());
    } else if cli.quiet {
        args.push("--quiet".into());
    }
    args
}

/// The command line recorded as spec provenance.
fn invocation() -> String {
    std::env::args().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_collate_command() {
        let cli = Cli::try_parse_from(["mah", "collate", "out.mbox", "a.mbox", "b.mbox"]).unwrap();
        match cli.command {
            Command::Collate(args) => {
                assert_eq!(args.inputs.len(), 2);
                assert!(!args.drop_missing_id);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn collate_requires_an_input() {
        assert!(Cli::try_parse_from(["mah", "collate", "out.mbox"]).is_err());
    }

    #[test]
    fn archiver_flag_collects_argv() {
        let cli = Cli::try_parse_from([
            "mah",
            "--archiver",
            "python3",
            "--archiver",
            "shim.py",
            "generators",
            "verify",
            "--load",
            "a.json",
            "b.json",
        ])
        .unwrap();
        assert_eq!(cli.archiver, ["python3", "shim.py"]);
        match cli.command {
            Command::Generators(RunnerArgs {
                mode: RunnerMode::Verify(v),
            }) => assert_eq!(v.load.len(), 2),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn passthrough_keeps_hyphenated_archiver_args() {
        let cli = Cli::try_parse_from([
            "mah",
            "--archiver",
            "python3",
            "--archiver=-u",
            "--shape",
            "oldest/legacy",
            "-q",
            "run-all",
        ])
        .unwrap();
        let args: Vec<String> = passthrough_args(&cli)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "--archiver=python3",
                "--archiver=-u",
                "--shape",
                "oldest/legacy",
                "--quiet"
            ]
        );
    }

    #[test]
    fn harness_errors_map_to_exit_codes() {
        let user: CliError = HarnessError::InvalidConfig {
            details: "x".to_string(),
        }
        .into();
        assert_eq!(user.exit_code(), 1);
        let runtime: CliError = HarnessError::library("spawn", "gone").into();
        assert_eq!(runtime.exit_code(), 2);
        assert_eq!(CliError::TestFailures(String::new()).exit_code(), 4);
    }

    #[test]
    fn reported_errors_escaping_a_runner_are_test_failures() {
        let drift = HarnessError::CorpusDrift {
            corpus: PathBuf::from("a.mbox"),
            index: 0,
            expected: "<a>".to_string(),
            found: "<b>".to_string(),
        };
        assert_eq!(CliError::from(drift).exit_code(), 4);
        let dup = HarnessError::DuplicateKey { key: "<a>".to_string() };
        assert_eq!(CliError::from(dup).exit_code(), 4);
        let missing = HarnessError::MissingGenerator { name: "x".to_string() };
        assert_eq!(CliError::from(missing).exit_code(), 1);
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["mah", "-v", "-q", "run-all"]).is_err());
    }
}
