#![forbid(unsafe_code)]

//! Mail Archive Harness (mah): differential regression testing for a
//! mailing-list archiving library.
//!
//! Three parts:
//! 1. **Compatibility adapter**: one `compute` call over every calling shape
//!    the library has had, picked once by an explicit probe
//! 2. **Differential runners**: record golden specs of generated ids or parsed
//!    bodies, then verify a live library against them
//! 3. **Mbox collator**: merge corpora into one deterministic, deduplicated file
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use mailarchive_harness::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use mailarchive_harness::core::config::Config;
//! use mailarchive_harness::corpus::collate::{CollatePolicy, collate};
//! ```

pub mod prelude;

pub mod archiver;
pub mod core;
pub mod corpus;
pub mod logger;
pub mod runner;
