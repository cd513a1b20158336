//! Parsing variant: does the archiver still extract the same body and
//! attachments?

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use sha3::{Digest, Sha3_256};

use crate::archiver::adapter::{AdapterOptions, ArchiverAdapter};
use crate::archiver::library::{AttachmentDescriptor, ComputeResult, FakeArgs};
use crate::core::errors::{HarnessError, Result};
use crate::corpus::mbox::Mbox;
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::runner::Session;
use crate::runner::generators::drift_error;
use crate::runner::golden::{OrderedMap, ParsingArgs, ParsingRecord, ParsingSpec};
use crate::runner::outcome::{Reporter, RunTally, TestOutcome};

const COMPONENT: &str = "parsing";

/// Hex SHA3-256 of the UTF-8 body.
#[must_use]
pub fn body_digest(body: &str) -> String {
    format!("{:x}", Sha3_256::digest(body.as_bytes()))
}

/// `(body digest, attachments)` as recorded; no document means no body and
/// no attachments.
fn observed(doc: Option<ComputeResult>) -> (Option<String>, Vec<AttachmentDescriptor>) {
    doc.map_or((None, Vec::new()), |doc| {
        (doc.body.as_deref().map(body_digest), doc.attachments)
    })
}

/// Record body digests and attachments for every message of every corpus.
pub fn generate(
    session: &mut Session<'_>,
    corpora: &[PathBuf],
    parse_html: bool,
    cmd: &str,
    reporter: &mut Reporter<'_>,
) -> Result<ParsingSpec> {
    let mut adapter = adapter_for(session, parse_html)?;
    let args = FakeArgs::default();
    let mut spec = ParsingSpec {
        args: ParsingArgs {
            cmd: cmd.to_string(),
            parse_html,
        },
        parsing: OrderedMap::new(),
    };

    for corpus in corpora {
        reporter.note(&format!(
            "Generating parsing specs for file '{}'...",
            corpus.display()
        ))?;
        let mbox = Mbox::open(corpus)?;
        let mut records = Vec::with_capacity(mbox.len());
        for (index, message) in mbox.iter() {
            let lid = session.list_id_for(&message)?;
            let doc = adapter.compute(&args, &lid, false, &message, message.bytes)?;
            let (body_sha3_256, attachments) = observed(doc);
            records.push(ParsingRecord {
                index,
                message_id: message.message_id_or_empty().to_string(),
                body_sha3_256,
                attachments,
            });
        }
        spec.parsing.insert(corpus.display().to_string(), records);
    }
    Ok(spec)
}

/// Re-parse every recorded message and compare digests and attachments.
///
/// A message counts as one failure even when both its body and its
/// attachments differ.
pub fn verify(
    session: &mut Session<'_>,
    spec_path: &Path,
    spec: &ParsingSpec,
    reporter: &mut Reporter<'_>,
) -> Result<RunTally> {
    let mut start = LogEntry::new(EventType::RunStart, Severity::Info).component(COMPONENT);
    start.path = Some(spec_path.display().to_string());
    session.log.emit(&start);

    let mut adapter = adapter_for(session, spec.args.parse_html)?;
    let args = FakeArgs::default();
    let mut tally = RunTally::default();

    for (corpus, records) in spec.parsing.iter() {
        let mbox = Mbox::open(corpus)?;
        if records.len() != mbox.len() {
            reporter.warn(&format!(
                "parsing run for {corpus} contains {} tests, but mbox file has {} emails!",
                records.len(),
                mbox.len()
            ))?;
            let mut entry =
                LogEntry::new(EventType::CountMismatch, Severity::Warning).component(COMPONENT);
            entry.path = Some(corpus.to_string());
            entry.count = Some(records.len());
            session.log.emit(&entry);
        }

        for record in records {
            let message = match mbox.message(record.index) {
                Some(m) if m.message_id_or_empty() == record.message_id => m,
                found => {
                    let found_id = found
                        .as_ref()
                        .map_or("<no such message>", |m| m.message_id_or_empty());
                    reporter.sequence(&format!(
                        "index {}: expected message-id '{}', corpus has '{found_id}'; skipping",
                        record.index, record.message_id
                    ))?;
                    let err = drift_error(&mbox, record.index, &record.message_id, found_id);
                    let mut entry =
                        LogEntry::reported(EventType::CorpusDrift, &err).component(COMPONENT);
                    entry.index = Some(record.index);
                    session.log.emit(&entry);
                    tally.record(TestOutcome::Sequence);
                    continue;
                }
            };

            let lid = session.list_id_for(&message)?;
            let doc = adapter.compute(&args, &lid, false, &message, message.bytes)?;
            let (digest, attachments) = observed(doc);

            let mut mismatches = Vec::new();
            if digest != record.body_sha3_256 {
                let expected = render_digest(record.body_sha3_256.as_deref());
                let got = render_digest(digest.as_deref());
                reporter.fail(&format!(
                    "parsing index {:>2}: Expected: {expected} Got: {got}",
                    record.index
                ))?;
                mismatches.push(("body", expected, got));
            }
            if attachments != record.attachments {
                let expected = serde_json::to_string(&record.attachments)?;
                let got = serde_json::to_string(&attachments)?;
                reporter.fail(&format!(
                    "attachments index {:>2}: Expected: {expected} Got: {got}",
                    record.index
                ))?;
                mismatches.push(("attachments", expected, got));
            }

            if mismatches.is_empty() {
                reporter.pass(&format!("index {}", record.index))?;
                tally.record(TestOutcome::Pass);
                continue;
            }
            for (what, expected, got) in mismatches {
                let err = HarnessError::ComparisonMismatch {
                    context: format!("{corpus}:{what}"),
                    index: record.index,
                    expected: expected.clone(),
                    got: got.clone(),
                };
                let mut entry = LogEntry::reported(EventType::TestFail, &err).component(COMPONENT);
                entry.severity = Severity::Error;
                entry.index = Some(record.index);
                entry.message_id = Some(record.message_id.clone());
                entry.expected = Some(expected);
                entry.got = Some(got);
                session.log.emit(&entry);
            }
            tally.record(TestOutcome::Fail);
        }
    }

    let mut done = LogEntry::new(EventType::RunComplete, Severity::Info).component(COMPONENT);
    done.path = Some(spec_path.display().to_string());
    done.count = Some(tally.tests_run);
    done.failed = Some(tally.failed);
    session.log.emit(&done);
    Ok(tally)
}

fn adapter_for(session: &mut Session<'_>, parse_html: bool) -> Result<ArchiverAdapter> {
    ArchiverAdapter::new(
        &mut *session.library,
        session.options.selection,
        &AdapterOptions {
            generator: None,
            parse_html,
        },
    )
}

fn render_digest(digest: Option<&str>) -> String {
    digest.unwrap_or("None").to_string()
}
