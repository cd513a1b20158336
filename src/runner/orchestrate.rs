//! `run-all`: verify every section of every golden spec in a child process
//! and aggregate the verdicts.

#![allow(missing_docs)]

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use crate::core::errors::{HarnessError, Result};
use crate::runner::golden::{self, SpecKind};
use crate::runner::outcome::{Reporter, RunTally, parse_summary_line};

const RULE: &str = "-------------------------------------";

/// How to re-invoke the harness for one spec section.
#[derive(Debug, Clone)]
pub struct OrchestrateOptions {
    /// Harness executable.
    pub program: PathBuf,
    /// Arguments placed before `<section> verify --load <spec>`.
    pub base_args: Vec<OsString>,
    /// Stop after the first spec file with a failing section.
    pub fail_fast: bool,
}

/// Totals over all spec sections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestrateSummary {
    pub sections: usize,
    pub good: usize,
    pub bad: usize,
    /// Sum of the scraped `[DONE]` lines.
    pub tally: RunTally,
    pub elapsed: Duration,
}

impl OrchestrateSummary {
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.bad == 0
    }
}

impl fmt::Display for OrchestrateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(
            f,
            "Done with {} tests in {:.2} seconds",
            self.sections,
            self.elapsed.as_secs_f64()
        )?;
        writeln!(f, "{} Were GOOD, {} were BAD", self.good, self.bad)?;
        write!(f, "{RULE}")
    }
}

/// Spec files to run: the explicit list, or every `*.json` in `spec_dir`
/// sorted by name.
pub fn spec_files(load: &[PathBuf], spec_dir: &Path) -> Result<Vec<PathBuf>> {
    if !load.is_empty() {
        return Ok(load.to_vec());
    }
    let entries = std::fs::read_dir(spec_dir).map_err(|source| HarnessError::io(spec_dir, source))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|source| HarnessError::io(spec_dir, source))?.path();
        if path.extension().is_some_and(|ext| ext == "json") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Run `<section> verify --load <spec>` for each section of each spec.
pub fn run_all(
    options: &OrchestrateOptions,
    specs: &[PathBuf],
    reporter: &mut Reporter<'_>,
) -> Result<OrchestrateSummary> {
    let started = Instant::now();
    let mut summary = OrchestrateSummary::default();

    for spec in specs {
        let mut spec_failed = false;
        for kind in golden::sections(spec)? {
            summary.sections += 1;
            if run_section(options, spec, kind, reporter, &mut summary.tally)? {
                summary.good += 1;
            } else {
                summary.bad += 1;
                spec_failed = true;
            }
        }
        if spec_failed && options.fail_fast {
            tracing::info!(spec = %spec.display(), "stopping after first failing spec");
            break;
        }
    }

    summary.elapsed = started.elapsed();
    Ok(summary)
}

fn run_section(
    options: &OrchestrateOptions,
    spec: &Path,
    kind: SpecKind,
    reporter: &mut Reporter<'_>,
    tally: &mut RunTally,
) -> Result<bool> {
    let section = kind.section();
    reporter.info(&format!("Running '{section}' tests from {}...", spec.display()))?;

    let output = Command::new(&options.program)
        .args(&options.base_args)
        .arg(section)
        .arg("verify")
        .arg("--load")
        .arg(spec)
        .output()
        .map_err(|source| HarnessError::io(&options.program, source))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stdout.lines() {
        reporter.info(line)?;
    }
    for line in stderr.lines() {
        reporter.note(line)?;
    }

    match parse_summary_line(&stdout) {
        Some((tests_run, failed)) => {
            tally.tests_run += tests_run;
            tally.failed += failed;
        }
        None => tracing::warn!(section, spec = %spec.display(), "no summary line in child output"),
    }

    if output.status.success() {
        return Ok(true);
    }
    let code = output
        .status
        .code()
        .map_or_else(|| "signal".to_string(), |c| c.to_string());
    reporter.info(&format!(
        "{section} test from {} failed with code {code}",
        spec.display()
    ))?;
    Ok(false)
}
