//! Generator variant: does each generator still derive the same mid?

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use crate::archiver::adapter::{AdapterOptions, ArchiverAdapter};
use crate::archiver::library::FakeArgs;
use crate::core::errors::{HarnessError, Result};
use crate::corpus::mbox::Mbox;
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::runner::golden::{GeneratorArgs, GeneratorRecord, GeneratorSpec, OrderedMap};
use crate::runner::outcome::{Reporter, RunTally, TestOutcome};
use crate::runner::Session;

const COMPONENT: &str = "generators";
const LEGACY_SUFFIX: &str = "-legacy";

/// Order generator names so `X-legacy` follows `X` directly.
///
/// The sort is stable; duplicate names keep their relative order.
#[must_use]
pub fn order_generators(names: &[String]) -> Vec<String> {
    let mut sorted = names.to_vec();
    sorted.sort_by(|a, b| legacy_key(a).cmp(&legacy_key(b)));
    sorted
}

fn legacy_key(name: &str) -> (&str, bool) {
    name.strip_suffix(LEGACY_SUFFIX)
        .map_or((name, false), |base| (base, true))
}

/// Record every message of every corpus under each generator.
///
/// `only` restricts the generator set; names the library does not implement
/// are reported and skipped.
pub fn generate(
    session: &mut Session<'_>,
    corpora: &[PathBuf],
    only: &[String],
    cmd: &str,
    reporter: &mut Reporter<'_>,
) -> Result<GeneratorSpec> {
    let descriptor = session.library.describe()?;
    let mut names = descriptor.generators.clone();
    if !only.is_empty() {
        for name in only {
            if !names.contains(name) {
                report_missing(session, reporter, name)?;
            }
        }
        names.retain(|n| only.contains(n));
    }
    let names = order_generators(&names);

    let mut spec = GeneratorSpec {
        args: GeneratorArgs {
            cmd: cmd.to_string(),
        },
        generators: OrderedMap::new(),
    };

    for corpus in corpora {
        let mbox = Mbox::open(corpus)?;
        let key = corpus.display().to_string();
        let mut per_generator = OrderedMap::new();
        for name in &names {
            reporter.note(&format!("Generating specs for type '{name}'..."))?;
            let records = generate_one(session, &mbox, name, reporter)?;
            per_generator.insert(name.clone(), records);
        }
        spec.generators.insert(key, per_generator);
    }
    Ok(spec)
}

fn generate_one(
    session: &mut Session<'_>,
    mbox: &Mbox,
    generator: &str,
    reporter: &mut Reporter<'_>,
) -> Result<Vec<GeneratorRecord>> {
    let mut adapter = ArchiverAdapter::new(
        &mut *session.library,
        session.options.selection,
        &AdapterOptions::for_generator(generator),
    )?;
    let args = FakeArgs::default();
    let mut records = Vec::with_capacity(mbox.len());
    for (index, message) in mbox.iter() {
        let lid = session.list_id_for(&message)?;
        match adapter.compute(&args, &lid, false, &message, message.bytes)? {
            Some(doc) => records.push(GeneratorRecord {
                index,
                message_id: message.message_id_or_empty().to_string(),
                generated: doc.mid,
                alternate: None,
            }),
            None => reporter.warn(&format!(
                "{generator} produced no document for index {index}, not recorded"
            ))?,
        }
    }
    tracing::debug!(generator, corpus = %mbox.path().display(), records = records.len(), "generated");
    Ok(records)
}

/// Re-run every recorded message and compare live mids to the spec.
pub fn verify(
    session: &mut Session<'_>,
    spec_path: &Path,
    spec: &GeneratorSpec,
    reporter: &mut Reporter<'_>,
) -> Result<RunTally> {
    let mut start = LogEntry::new(EventType::RunStart, Severity::Info).component(COMPONENT);
    start.path = Some(spec_path.display().to_string());
    session.log.emit(&start);

    let implemented = session.library.describe()?.generators;
    let mut tally = RunTally::default();

    for (corpus, runs) in spec.generators.iter() {
        let mbox = Mbox::open(corpus)?;
        for (generator, records) in runs.iter() {
            if !implemented.iter().any(|g| g == generator) {
                report_missing(session, reporter, generator)?;
                for _ in records {
                    tally.record(TestOutcome::Skipped);
                }
                continue;
            }
            if records.len() != mbox.len() {
                reporter.warn(&format!(
                    "{generator} run for {corpus} contains {} tests, but mbox file has {} emails!",
                    records.len(),
                    mbox.len()
                ))?;
                let mut entry =
                    LogEntry::new(EventType::CountMismatch, Severity::Warning).component(COMPONENT);
                entry.path = Some(corpus.to_string());
                entry.generator = Some(generator.to_string());
                entry.count = Some(records.len());
                session.log.emit(&entry);
            }
            verify_one(session, &mbox, generator, records, reporter, &mut tally)?;
        }
    }

    let mut done = LogEntry::new(EventType::RunComplete, Severity::Info).component(COMPONENT);
    done.path = Some(spec_path.display().to_string());
    done.count = Some(tally.tests_run);
    done.failed = Some(tally.failed);
    session.log.emit(&done);
    Ok(tally)
}

fn verify_one(
    session: &mut Session<'_>,
    mbox: &Mbox,
    generator: &str,
    records: &[GeneratorRecord],
    reporter: &mut Reporter<'_>,
    tally: &mut RunTally,
) -> Result<()> {
    let mut adapter = ArchiverAdapter::new(
        &mut *session.library,
        session.options.selection,
        &AdapterOptions::for_generator(generator),
    )?;
    let args = FakeArgs::default();

    for record in records {
        let Some(message) = mbox.message(record.index) else {
            report_drift(session, reporter, mbox, generator, record, "<no such message>")?;
            tally.record(TestOutcome::Sequence);
            continue;
        };
        if message.message_id_or_empty() != record.message_id {
            report_drift(
                session,
                reporter,
                mbox,
                generator,
                record,
                message.message_id_or_empty(),
            )?;
            tally.record(TestOutcome::Sequence);
            continue;
        }

        let lid = session.list_id_for(&message)?;
        let got = adapter
            .compute(&args, &lid, false, &message, message.bytes)?
            .map(|doc| doc.mid);
        let matches = got.as_deref().is_some_and(|mid| {
            mid == record.generated || record.alternate.as_deref() == Some(mid)
        });

        if matches {
            reporter.pass(&format!("{generator} index {}", record.index))?;
            tally.record(TestOutcome::Pass);
        } else {
            let got = got.unwrap_or_else(|| "<none>".to_string());
            reporter.fail(&format!(
                "{generator}, index {}: Expected '{}', got '{got}'!",
                record.index, record.generated
            ))?;
            let err = HarnessError::ComparisonMismatch {
                context: format!("{}:{generator}", mbox.path().display()),
                index: record.index,
                expected: record.generated.clone(),
                got: got.clone(),
            };
            let mut entry = LogEntry::reported(EventType::TestFail, &err).component(COMPONENT);
            entry.severity = Severity::Error;
            entry.generator = Some(generator.to_string());
            entry.index = Some(record.index);
            entry.expected = Some(record.generated.clone());
            entry.got = Some(got);
            session.log.emit(&entry);
            tally.record(TestOutcome::Fail);
        }
    }
    Ok(())
}

fn report_missing(session: &mut Session<'_>, reporter: &mut Reporter<'_>, name: &str) -> Result<()> {
    let err = HarnessError::MissingGenerator {
        name: name.to_string(),
    };
    reporter.warn(&format!("generator '{name}' is not implemented by this archiver, skipping"))?;
    let mut entry = LogEntry::reported(EventType::MissingGenerator, &err).component(COMPONENT);
    entry.generator = Some(name.to_string());
    session.log.emit(&entry);
    tracing::warn!(code = err.code(), generator = name, "missing generator");
    Ok(())
}

pub(crate) fn drift_error(mbox: &Mbox, record_index: usize, expected: &str, found: &str) -> HarnessError {
    HarnessError::CorpusDrift {
        corpus: mbox.path().to_path_buf(),
        index: record_index,
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

fn report_drift(
    session: &mut Session<'_>,
    reporter: &mut Reporter<'_>,
    mbox: &Mbox,
    generator: &str,
    record: &GeneratorRecord,
    found: &str,
) -> Result<()> {
    reporter.sequence(&format!(
        "{generator}, index {}: expected message-id '{}', corpus has '{found}'; skipping",
        record.index, record.message_id
    ))?;
    let err = drift_error(mbox, record.index, &record.message_id, found);
    let mut entry = LogEntry::reported(EventType::CorpusDrift, &err).component(COMPONENT);
    entry.generator = Some(generator.to_string());
    entry.index = Some(record.index);
    session.log.emit(&entry);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn legacy_variant_follows_its_base() {
        let ordered = order_generators(&names(&["medium-legacy", "full", "medium", "cluster"]));
        assert_eq!(ordered, names(&["cluster", "full", "medium", "medium-legacy"]));
    }

    #[test]
    fn legacy_suffix_does_not_interleave_with_longer_names() {
        // Plain byte order would put "medium-extra" before "medium-legacy".
        let ordered = order_generators(&names(&["medium-extra", "medium-legacy", "medium"]));
        assert_eq!(ordered, names(&["medium", "medium-legacy", "medium-extra"]));
    }
}
