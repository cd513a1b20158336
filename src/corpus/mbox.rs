//! mbox corpus reader.
//!
//! A corpus is a concatenation of messages, each introduced by an envelope
//! line starting with `From `. A message runs from its envelope line up to
//! the next envelope line; when the line right before the next envelope (or
//! before EOF) is empty, that one separator line belongs to the container and
//! is excluded from the message. Everything else, including the message's
//! final line ending, is kept byte for byte.
//!
//! Bytes before the first envelope line are not part of any message.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use memchr::memchr;

use crate::core::errors::{HarnessError, Result};
use crate::corpus::message::{RawMessage, strip_eol};

const ENVELOPE_PREFIX: &[u8] = b"From ";

/// Byte layout of one message inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    /// Start of the envelope line.
    start: usize,
    /// First byte after the envelope line's line ending.
    body_start: usize,
    /// One past the last byte of the message.
    end: usize,
}

/// Line-ending convention of a message, judged from its envelope line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    #[must_use]
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Lf => b"\n",
            Self::CrLf => b"\r\n",
        }
    }

    #[must_use]
    pub const fn is_crlf(self) -> bool {
        matches!(self, Self::CrLf)
    }
}

/// A fully loaded mbox file with its message table.
#[derive(Debug, Clone)]
pub struct Mbox {
    path: PathBuf,
    data: Vec<u8>,
    entries: Vec<Entry>,
}

impl Mbox {
    /// Read and index an mbox file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| HarnessError::io(path, source))?;
        Ok(Self::from_bytes(path, data))
    }

    /// Index an in-memory mbox. `path` is only used for reporting.
    #[must_use]
    pub fn from_bytes(path: impl Into<PathBuf>, data: Vec<u8>) -> Self {
        let entries = index_messages(&data);
        Self {
            path: path.into(),
            data,
            entries,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Message at `index` without its envelope line.
    #[must_use]
    pub fn message(&self, index: usize) -> Option<RawMessage<'_>> {
        let entry = self.entries.get(index)?;
        let envelope = String::from_utf8_lossy(strip_eol(&self.data[entry.start..entry.body_start]));
        Some(RawMessage::new(
            envelope,
            &self.data[entry.body_start..entry.end],
        ))
    }

    /// Exact stored bytes of the message at `index`, envelope line included.
    #[must_use]
    pub fn raw_entry(&self, index: usize) -> Option<&[u8]> {
        self.entries
            .get(index)
            .map(|entry| &self.data[entry.start..entry.end])
    }

    /// Line ending used by the envelope line of the message at `index`.
    #[must_use]
    pub fn line_ending(&self, index: usize) -> Option<LineEnding> {
        let entry = self.entries.get(index)?;
        let envelope = &self.data[entry.start..entry.body_start];
        Some(if envelope.ends_with(b"\r\n") {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        })
    }

    /// Messages in stored order, paired with their index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, RawMessage<'_>)> {
        (0..self.entries.len()).filter_map(move |i| self.message(i).map(|m| (i, m)))
    }
}

fn is_blank_line(line: &[u8]) -> bool {
    line == b"\n" || line == b"\r\n"
}

fn index_messages(data: &[u8]) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut open: Option<(usize, usize)> = None;
    // Start of the immediately preceding line, when it was blank.
    let mut last_blank: Option<usize> = None;
    let mut pos = 0;

    while pos < data.len() {
        let line_start = pos;
        let line_end = memchr(b'\n', &data[pos..]).map_or(data.len(), |i| pos + i + 1);
        let line = &data[line_start..line_end];
        pos = line_end;

        if line.starts_with(ENVELOPE_PREFIX) {
            if let Some((start, body_start)) = open.take() {
                entries.push(Entry {
                    start,
                    body_start,
                    end: last_blank.unwrap_or(line_start),
                });
            }
            open = Some((line_start, line_end));
            last_blank = None;
        } else if is_blank_line(line) {
            last_blank = Some(line_start);
        } else {
            last_blank = None;
        }
    }

    if let Some((start, body_start)) = open {
        entries.push(Entry {
            start,
            body_start,
            end: last_blank.unwrap_or(data.len()),
        });
    }
    entries
}
