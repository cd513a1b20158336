//! Corpus handling: stored messages, mbox containers, deterministic collation.

pub mod collate;
pub mod mbox;
pub mod message;
