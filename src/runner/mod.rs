//! Differential test runners: record golden specs and verify live output
//! against them.

pub mod generators;
pub mod golden;
pub mod orchestrate;
pub mod outcome;
pub mod parsing;

use std::path::Path;

use serde::Serialize;

use crate::archiver::library::ArchiverLibrary;
use crate::archiver::shape::ShapeSelection;
use crate::core::errors::Result;
use crate::corpus::message::RawMessage;
use crate::logger::jsonl::{EventLog, EventType, LogEntry, Severity};

/// List-ID header value used when a message carries none.
pub const UNKNOWN_LIST_ID: &str = "??";

/// Knobs shared by both runner variants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub selection: ShapeSelection,
    /// Replaces the normalised List-ID of every message.
    pub list_id: Option<String>,
    /// Stop after the first spec file that had failures.
    pub fail_fast: bool,
}

/// A loaded library plus everything a run needs around it.
pub struct Session<'a> {
    pub library: &'a mut dyn ArchiverLibrary,
    pub options: RunOptions,
    pub log: &'a mut EventLog,
}

impl<'a> Session<'a> {
    pub fn new(
        library: &'a mut dyn ArchiverLibrary,
        options: RunOptions,
        log: &'a mut EventLog,
    ) -> Self {
        Self {
            library,
            options,
            log,
        }
    }

    /// The list id handed to `compute` for `message`.
    pub fn list_id_for(&mut self, message: &RawMessage<'_>) -> Result<String> {
        if let Some(lid) = &self.options.list_id {
            return Ok(lid.clone());
        }
        let raw = message
            .headers
            .list_id
            .as_deref()
            .unwrap_or(UNKNOWN_LIST_ID);
        self.library.normalize_lid(raw)
    }

    /// Write a freshly generated spec and record it in the event log.
    pub fn write_spec<T: Serialize>(&mut self, component: &str, path: &Path, spec: &T) -> Result<()> {
        golden::save(path, spec)?;
        let mut entry = LogEntry::new(EventType::SpecWritten, Severity::Info).component(component);
        entry.path = Some(path.display().to_string());
        self.log.emit(&entry);
        tracing::info!(path = %path.display(), component, "golden spec written");
        Ok(())
    }
}
