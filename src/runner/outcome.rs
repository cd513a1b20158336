//! Per-message outcomes, run tallies and the report writer.

#![allow(missing_docs)]

use std::io::{self, Write};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::errors::{HarnessError, Result};

/// Result of checking one recorded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Pass,
    Fail,
    /// The corpus no longer holds the recorded message at that index.
    Sequence,
    Skipped,
}

/// Aggregate counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    pub tests_run: usize,
    pub failed: usize,
    pub skipped: usize,
    pub drifted: usize,
}

impl RunTally {
    pub const fn record(&mut self, outcome: TestOutcome) {
        match outcome {
            TestOutcome::Pass => self.tests_run += 1,
            TestOutcome::Fail => {
                self.tests_run += 1;
                self.failed += 1;
            }
            TestOutcome::Sequence => self.drifted += 1,
            TestOutcome::Skipped => self.skipped += 1,
        }
    }

    pub const fn merge(&mut self, other: Self) {
        self.tests_run += other.tests_run;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.drifted += other.drifted;
    }

    #[must_use]
    pub const fn passed(&self) -> bool {
        self.failed == 0
    }

    /// The fixed summary line scraped by `run-all`.
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!("[DONE] {} tests run, {} failed.", self.tests_run, self.failed)
    }
}

static SUMMARY_RE: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\[DONE\] (\d+) tests run, (\d+) failed\."));

/// Find the last summary line in captured output: `(tests_run, failed)`.
#[must_use]
pub fn parse_summary_line(output: &str) -> Option<(usize, usize)> {
    let re = SUMMARY_RE.as_ref().ok()?;
    let caps = re.captures_iter(output).last()?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Where report lines go: passes and summaries on `out`, failures and
/// warnings on `err`.
pub struct Reporter<'w> {
    out: &'w mut dyn Write,
    err: &'w mut dyn Write,
}

fn report_io(source: io::Error) -> HarnessError {
    HarnessError::io("<report>", source)
}

impl<'w> Reporter<'w> {
    pub fn new(out: &'w mut dyn Write, err: &'w mut dyn Write) -> Self {
        Self { out, err }
    }

    pub fn pass(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "[PASS] {line}").map_err(report_io)
    }

    pub fn fail(&mut self, line: &str) -> Result<()> {
        writeln!(self.err, "[FAIL] {line}").map_err(report_io)
    }

    pub fn sequence(&mut self, line: &str) -> Result<()> {
        writeln!(self.err, "[SEQ] {line}").map_err(report_io)
    }

    pub fn warn(&mut self, line: &str) -> Result<()> {
        writeln!(self.err, "Warning: {line}").map_err(report_io)
    }

    /// Progress note on `err`.
    pub fn note(&mut self, line: &str) -> Result<()> {
        writeln!(self.err, "{line}").map_err(report_io)
    }

    pub fn info(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{line}").map_err(report_io)
    }

    pub fn summary(&mut self, tally: &RunTally) -> Result<()> {
        writeln!(self.out, "{}", tally.summary_line()).map_err(report_io)?;
        self.out.flush().map_err(report_io)?;
        self.err.flush().map_err(report_io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_and_skips_are_not_tests() {
        let mut tally = RunTally::default();
        for outcome in [
            TestOutcome::Pass,
            TestOutcome::Fail,
            TestOutcome::Sequence,
            TestOutcome::Skipped,
            TestOutcome::Skipped,
        ] {
            tally.record(outcome);
        }
        assert_eq!(
            tally,
            RunTally {
                tests_run: 2,
                failed: 1,
                skipped: 2,
                drifted: 1
            }
        );
        assert_eq!(tally.summary_line(), "[DONE] 2 tests run, 1 failed.");
        assert!(!tally.passed());
    }

    #[test]
    fn summary_line_is_scraped_back() {
        let tally = RunTally {
            tests_run: 17,
            failed: 3,
            ..RunTally::default()
        };
        let output = format!("[PASS] index 0\n{}\n", tally.summary_line());
        assert_eq!(parse_summary_line(&output), Some((17, 3)));
        assert_eq!(parse_summary_line("nothing here"), None);
    }

    #[test]
    fn reporter_splits_streams() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        {
            let mut r = Reporter::new(&mut out, &mut err);
            r.pass("medium index 0").unwrap();
            r.fail("medium, index 1: Expected 'a', got 'b'!").unwrap();
            r.sequence("drift").unwrap();
            r.summary(&RunTally::default()).unwrap();
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[PASS] medium index 0\n[DONE] 0 tests run, 0 failed.\n"
        );
        assert_eq!(
            String::from_utf8(err).unwrap(),
            "[FAIL] medium, index 1: Expected 'a', got 'b'!\n[SEQ] drift\n"
        );
    }
}
