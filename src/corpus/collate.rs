//! Deterministic mbox collation.
//!
//! Merges several corpora into one, keyed by [`CanonicalKey`] and written in
//! ascending key order, so the collated corpus does not depend on the order
//! messages were delivered in. Each retained message is written exactly as
//! stored (envelope line through its last line ending) followed by one
//! separator line ending. The separator convention is the one of the first
//! message seen; mixed conventions inside one container are not valid mbox.
//!
//! Duplicate keys are last-writer-wins: the retained bytes for a key come
//! from the last input that carried it, so input order decides which copy
//! survives even though it never changes the output order.

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::{HarnessError, Result};
use crate::corpus::mbox::{LineEnding, Mbox};
use crate::corpus::message::RawMessage;
use crate::logger::jsonl::{EventLog, EventType, LogEntry, Severity};

/// What to do with messages that carry no Message-ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollatePolicy {
    /// Keep them under a fallback key built from Date, Subject or the envelope line.
    #[default]
    #[serde(rename = "fallback")]
    FallbackKey,
    /// Count them and leave them out of the output.
    #[serde(rename = "drop")]
    DropMissingId,
}

impl FromStr for CollatePolicy {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(Self::FallbackKey),
            "drop" => Ok(Self::DropMissingId),
            other => Err(HarnessError::InvalidConfig {
                details: format!("collate.missing_id must be 'fallback' or 'drop', got '{other}'"),
            }),
        }
    }
}

/// Sort and dedup key for one message.
///
/// Variant order puts every fallback key after every Message-ID key,
/// whatever bytes either contains.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CanonicalKey {
    MessageId(String),
    Fallback(String),
}

impl CanonicalKey {
    /// Derive the key for `message`.
    #[must_use]
    pub fn for_message(message: &RawMessage<'_>) -> Self {
        if let Some(id) = message.headers.message_id_trimmed() {
            return Self::MessageId(id.to_string());
        }
        let alt = [
            message.headers.date.as_deref(),
            message.headers.subject.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or_else(|| message.envelope.trim());
        Self::Fallback(alt.to_string())
    }

    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MessageId(id) => f.write_str(id),
            Self::Fallback(alt) => write!(f, "~{alt}"),
        }
    }
}

/// Final tallies of one collation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CollateCounts {
    pub written: usize,
    /// Distinct fallback keys, kept or dropped per policy.
    pub skipped_no_id: usize,
    pub duplicates_dropped: usize,
    pub crlf: bool,
}

impl CollateCounts {
    /// The one-line report printed after a collation.
    #[must_use]
    pub fn summary_line(&self, output: &Path) -> String {
        format!(
            "Wrote {} emails to {} with CRLF {} ({} without message-id, {} dupes skipped)",
            self.written,
            output.display(),
            if self.crlf { "True" } else { "False" },
            self.skipped_no_id,
            self.duplicates_dropped
        )
    }
}

impl fmt::Display for CollateCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} emails with CRLF {} ({} without message-id, {} dupes skipped)",
            self.written,
            if self.crlf { "True" } else { "False" },
            self.skipped_no_id,
            self.duplicates_dropped
        )
    }
}

/// Accumulates messages from any number of corpora.
#[derive(Debug, Default)]
pub struct Collator {
    policy: CollatePolicy,
    messages: BTreeMap<CanonicalKey, Vec<u8>>,
    line_ending: Option<LineEnding>,
    dropped_no_id: BTreeSet<CanonicalKey>,
    duplicates: usize,
    duplicate_keys: Vec<String>,
}

impl Collator {
    #[must_use]
    pub fn new(policy: CollatePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Read `path` and add every message it holds.
    pub fn add_file(&mut self, path: &Path) -> Result<()> {
        let mbox = Mbox::open(path)?;
        self.add_mbox(&mbox);
        Ok(())
    }

    /// Add every message of `mbox` in stored order.
    pub fn add_mbox(&mut self, mbox: &Mbox) {
        for (index, message) in mbox.iter() {
            tracing::debug!(corpus = %mbox.path().display(), index, envelope = %message.envelope);

            if self.line_ending.is_none() {
                self.line_ending = mbox.line_ending(index);
            }

            let key = CanonicalKey::for_message(&message);
            if key.is_fallback() {
                if self.policy == CollatePolicy::DropMissingId {
                    tracing::warn!(envelope = %message.envelope, "no message id, dropping");
                    self.dropped_no_id.insert(key);
                    continue;
                }
                tracing::warn!(envelope = %message.envelope, key = %key, "no message id, sorting by date or subject");
            }

            let Some(raw) = mbox.raw_entry(index) else {
                continue;
            };
            let key_text = key.to_string();
            if self.messages.insert(key, raw.to_vec()).is_some() {
                self.duplicates += 1;
                tracing::warn!("{}", HarnessError::DuplicateKey { key: key_text.clone() });
                self.duplicate_keys.push(key_text);
            }
        }
    }

    /// Keys that were overwritten, once per overwrite, in the order seen.
    #[must_use]
    pub fn duplicate_keys(&self) -> &[String] {
        &self.duplicate_keys
    }

    /// Keys currently retained, in output order.
    pub fn keys(&self) -> impl Iterator<Item = &CanonicalKey> {
        self.messages.keys()
    }

    /// Write the collated corpus. Returns the number of messages written.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<usize> {
        let eol = self.line_ending.unwrap_or(LineEnding::Lf).as_bytes();
        let mut written = 0;
        for raw in self.messages.values() {
            out.write_all(raw)?;
            out.write_all(eol)?;
            written += 1;
        }
        out.flush()?;
        Ok(written)
    }

    /// Counts for a run that wrote `written` messages.
    #[must_use]
    pub fn counts(&self, written: usize) -> CollateCounts {
        CollateCounts {
            written,
            skipped_no_id: self.dropped_no_id.len()
                + self.messages.keys().filter(|k| k.is_fallback()).count(),
            duplicates_dropped: self.duplicates,
            crlf: self.line_ending.is_some_and(LineEnding::is_crlf),
        }
    }
}

/// Collate `inputs` (in listed order) into `output`.
pub fn collate(output: &Path, inputs: &[PathBuf], policy: CollatePolicy) -> Result<CollateCounts> {
    collate_logged(output, inputs, policy, &mut EventLog::disabled())
}

/// [`collate`], recording duplicates and the final counts in `log`.
pub fn collate_logged(
    output: &Path,
    inputs: &[PathBuf],
    policy: CollatePolicy,
    log: &mut EventLog,
) -> Result<CollateCounts> {
    let mut collator = Collator::new(policy);
    for input in inputs {
        collator.add_file(input)?;
    }

    let file = File::create(output).map_err(|source| HarnessError::io(output, source))?;
    let mut writer = BufWriter::new(file);
    let written = collator
        .write_to(&mut writer)
        .map_err(|source| HarnessError::io(output, source))?;
    let counts = collator.counts(written);

    for key in collator.duplicate_keys() {
        let err = HarnessError::DuplicateKey { key: key.clone() };
        log.emit(&LogEntry::reported(EventType::CollateDuplicate, &err).component("collate"));
    }
    let mut done = LogEntry::new(EventType::CollateComplete, Severity::Info).component("collate");
    done.path = Some(output.display().to_string());
    done.count = Some(counts.written);
    done.details = Some(counts.to_string());
    log.emit(&done);
    Ok(counts)
}
