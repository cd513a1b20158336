//! One stored email: raw bytes plus a parsed header view.

#![allow(missing_docs)]

use std::borrow::Cow;

use memchr::memchr;

/// Headers the harness reads from every message.
///
/// Values are unfolded (continuation line breaks removed) but otherwise kept
/// as stored; callers trim when the comparison needs it. The first occurrence
/// of a header wins, matching how mail libraries answer a single-header
/// lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderView {
    pub message_id: Option<String>,
    pub list_id: Option<String>,
    pub date: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
}

impl HeaderView {
    /// Parse the header block at the start of `bytes`.
    ///
    /// Stops at the first empty line (LF or CRLF). Lines without a colon are
    /// skipped. Non-UTF-8 header bytes are decoded lossily.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Self {
        let mut view = Self::default();
        for (name, value) in unfolded_headers(bytes) {
            let slot = match name.to_ascii_lowercase().as_str() {
                "message-id" => &mut view.message_id,
                "list-id" => &mut view.list_id,
                "date" => &mut view.date,
                "subject" => &mut view.subject,
                "from" => &mut view.from,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        view
    }

    /// Trimmed Message-ID, or `None` if absent or blank.
    #[must_use]
    pub fn message_id_trimmed(&self) -> Option<&str> {
        self.message_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// An immutable stored message.
///
/// `bytes` is the message exactly as the archiver should see it: headers and
/// body, without the mbox envelope line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage<'a> {
    /// The mbox envelope line without its line ending (`From sender date`).
    pub envelope: Cow<'a, str>,
    pub bytes: &'a [u8],
    pub headers: HeaderView,
}

impl<'a> RawMessage<'a> {
    #[must_use]
    pub fn new(envelope: Cow<'a, str>, bytes: &'a [u8]) -> Self {
        let headers = HeaderView::parse(bytes);
        Self {
            envelope,
            bytes,
            headers,
        }
    }

    /// Trimmed Message-ID, or an empty string when the header is missing.
    #[must_use]
    pub fn message_id_or_empty(&self) -> &str {
        self.headers.message_id_trimmed().unwrap_or("")
    }
}

/// Iterate `(name, unfolded value)` pairs from a header block.
fn unfolded_headers(bytes: &[u8]) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let end = memchr(b'\n', &bytes[pos..]).map_or(bytes.len(), |i| pos + i + 1);
        let line = strip_eol(&bytes[pos..end]);
        pos = end;

        if line.is_empty() {
            break;
        }
        if matches!(line[0], b' ' | b'\t') {
            // Continuation of the previous header; a stray one before any header is dropped.
            if let Some((_, value)) = headers.last_mut() {
                value.push_str(&String::from_utf8_lossy(line));
            }
            continue;
        }
        let Some(colon) = memchr(b':', line) else {
            continue;
        };
        let name = String::from_utf8_lossy(&line[..colon]).trim().to_string();
        let value = String::from_utf8_lossy(&line[colon + 1..])
            .trim_start()
            .to_string();
        headers.push((name, value));
    }
    headers
}

pub(crate) fn strip_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
