//! JSONL event log: append-only line-delimited JSON describing a harness run.
//!
//! Each line is a self-contained JSON object assembled in memory and written
//! with one `write_all`, so a tailing reader never sees a partial line.
//!
//! Fallback chain:
//! 1. Primary file path
//! 2. stderr with `[MAH-JSONL]` prefix
//! 3. Silent discard (a run must never fail because of its event log)

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{HarnessError, Result};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Events a harness run can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStart,
    TestFail,
    CorpusDrift,
    MissingGenerator,
    CountMismatch,
    SpecWritten,
    CollateDuplicate,
    CollateComplete,
    RunComplete,
}

/// A single JSONL log entry; all fields optional except `ts`, `event`, `severity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Which runner or tool produced the event (`generators`, `parsing`, `collate`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Corpus or spec path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    /// Message index inside the corpus.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub got: Option<String>,
    /// Test or message count attached to summary events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
    /// MAH error code for reported conditions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            component: None,
            path: None,
            generator: None,
            index: None,
            message_id: None,
            expected: None,
            got: None,
            count: None,
            failed: None,
            error_code: None,
            details: None,
        }
    }

    /// Entry describing a reported (non-fatal) error.
    #[must_use]
    pub fn reported(event: EventType, err: &HarnessError) -> Self {
        let mut entry = Self::new(event, Severity::Warning);
        entry.error_code = Some(err.code().to_string());
        entry.details = Some(err.to_string());
        entry
    }

    #[must_use]
    pub fn component(mut self, component: &str) -> Self {
        self.component = Some(component.to_string());
        self
    }
}

/// Degradation state of the JSONL writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Stderr,
    Discard,
}

/// Append-only JSONL writer with a stderr fallback.
#[derive(Debug)]
pub struct JsonlWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    state: WriterState,
}

impl JsonlWriter {
    /// Open the log file, falling through the degradation chain on failure.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (writer, state) = match open_append(&path) {
            Ok(file) => (Some(BufWriter::new(file)), WriterState::Normal),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[MAH-JSONL] {e}; using stderr");
                (None, WriterState::Stderr)
            }
        };
        Self {
            path,
            writer,
            state,
        }
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[MAH-JSONL] serialize error: {e}");
                return;
            }
        };
        self.write_line(&line);
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut()
            && w.flush().is_err()
        {
            self.degrade();
        }
    }

    /// Current degradation state.
    #[must_use]
    pub const fn state(&self) -> &'static str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &str) {
        match self.state {
            WriterState::Normal => {
                let ok = self
                    .writer
                    .as_mut()
                    .is_some_and(|w| w.write_all(line.as_bytes()).is_ok());
                if !ok {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                if write!(io::stderr(), "[MAH-JSONL] {line}").is_err() {
                    self.degrade();
                }
            }
            WriterState::Discard => {}
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        self.state = match self.state {
            WriterState::Normal => {
                let _ = writeln!(
                    io::stderr(),
                    "[MAH-JSONL] write to {} failed, using stderr",
                    self.path.display()
                );
                WriterState::Stderr
            }
            WriterState::Stderr | WriterState::Discard => WriterState::Discard,
        };
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Optional event log handed to runners and the collator.
#[derive(Debug, Default)]
pub struct EventLog {
    writer: Option<JsonlWriter>,
}

impl EventLog {
    /// A log that records nothing.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { writer: None }
    }

    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Some(JsonlWriter::open(path)),
        }
    }

    /// Open `path` when configured, otherwise disabled.
    #[must_use]
    pub fn from_option(path: Option<&Path>) -> Self {
        path.map_or_else(Self::disabled, Self::open)
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    pub fn emit(&mut self, entry: &LogEntry) {
        if let Some(w) = self.writer.as_mut() {
            w.write_entry(entry);
        }
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            w.flush();
        }
    }
}

/// Open or create a file for appending, creating the parent directory.
fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| HarnessError::io(parent, source))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| HarnessError::io(path, source))
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn write_entry_produces_valid_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let mut writer = JsonlWriter::open(&path);

        writer.write_entry(&LogEntry::new(EventType::RunStart, Severity::Info).component("parsing"));
        writer.flush();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["event"], "run_start");
        assert_eq!(lines[0]["severity"], "info");
        assert_eq!(lines[0]["component"], "parsing");
    }

    #[test]
    fn appends_across_writers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/run.jsonl");
        for _ in 0..2 {
            let mut log = EventLog::open(&path);
            log.emit(&LogEntry::new(EventType::RunComplete, Severity::Info));
        }
        assert_eq!(read_lines(&path).len(), 2);
    }

    #[test]
    fn reported_error_carries_code() {
        let err = HarnessError::MissingGenerator {
            name: "medium".to_string(),
        };
        let entry = LogEntry::reported(EventType::MissingGenerator, &err);
        assert_eq!(entry.error_code.as_deref(), Some("MAH-2003"));
        assert_eq!(entry.severity, Severity::Warning);
    }

    #[test]
    fn optional_fields_omitted_when_none() {
        let json = serde_json::to_string(&LogEntry::new(EventType::SpecWritten, Severity::Info))
            .unwrap();
        assert!(!json.contains("\"path\""));
        assert!(!json.contains("\"index\""));
    }

    #[test]
    fn unwritable_primary_degrades_to_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let writer = JsonlWriter::open(blocker.join("run.jsonl"));
        assert_eq!(writer.state(), "stderr");
    }

    #[test]
    fn disabled_log_is_inert() {
        let mut log = EventLog::disabled();
        assert!(!log.is_enabled());
        log.emit(&LogEntry::new(EventType::TestFail, Severity::Error));
        log.flush();
    }
}
