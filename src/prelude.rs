//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use mailarchive_harness::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{HarnessError, Result};

// Corpus
pub use crate::corpus::collate::{CanonicalKey, CollateCounts, CollatePolicy, Collator, collate};
pub use crate::corpus::mbox::Mbox;
pub use crate::corpus::message::{HeaderView, RawMessage};

// Archiver
pub use crate::archiver::adapter::{AdapterOptions, ArchiverAdapter};
pub use crate::archiver::library::{
    ArchiverInstance, ArchiverLibrary, AttachmentDescriptor, ComputeCall, ComputeResult,
    ComputeReturn, ConstructorCall, ConstructorKeywords, FakeArgs, LibraryDescriptor,
};
pub use crate::archiver::process::ProcessLibrary;
pub use crate::archiver::shape::{
    CallingShape, ComputeShape, ConstructorShape, GeneratorChannel, ShapeSelection, probe,
};

// Runners
pub use crate::logger::jsonl::EventLog;
pub use crate::runner::golden::{GeneratorSpec, ParsingSpec};
pub use crate::runner::outcome::{Reporter, RunTally, TestOutcome};
pub use crate::runner::{RunOptions, Session};
