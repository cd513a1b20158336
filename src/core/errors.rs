//! MAH-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Top-level error type for the archive harness.
///
/// Fatal variants abort a run. Reported variants (`CorpusDrift`,
/// `ComparisonMismatch`, `MissingGenerator`, `DuplicateKey`) are built as
/// values so their code and message land in the report and the event log,
/// while the run continues.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("[MAH-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[MAH-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[MAH-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[MAH-1101] unsupported archiver library shape: {details}")]
    UnsupportedLibraryShape { details: String },

    #[error("[MAH-1102] archiver returned {got} for calling shape {shape}")]
    ShapeViolation { shape: String, got: String },

    #[error("[MAH-1103] archiver library failure in {context}: {details}")]
    Library {
        context: &'static str,
        details: String,
    },

    #[error("[MAH-2001] corpus drift in {corpus} at index {index}: expected message-id '{expected}', found '{found}'")]
    CorpusDrift {
        corpus: PathBuf,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("[MAH-2002] comparison mismatch in {context} at index {index}: expected '{expected}', got '{got}'")]
    ComparisonMismatch {
        context: String,
        index: usize,
        expected: String,
        got: String,
    },

    #[error("[MAH-2003] generator '{name}' is not implemented by the loaded archiver")]
    MissingGenerator { name: String },

    #[error("[MAH-2004] duplicate canonical key: {key}")]
    DuplicateKey { key: String },

    #[error("[MAH-2102] malformed golden specification {path}: {details}")]
    GoldenFormat { path: PathBuf, details: String },

    #[error("[MAH-2103] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[MAH-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HarnessError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "MAH-1001",
            Self::MissingConfig { .. } => "MAH-1002",
            Self::ConfigParse { .. } => "MAH-1003",
            Self::UnsupportedLibraryShape { .. } => "MAH-1101",
            Self::ShapeViolation { .. } => "MAH-1102",
            Self::Library { .. } => "MAH-1103",
            Self::CorpusDrift { .. } => "MAH-2001",
            Self::ComparisonMismatch { .. } => "MAH-2002",
            Self::MissingGenerator { .. } => "MAH-2003",
            Self::DuplicateKey { .. } => "MAH-2004",
            Self::GoldenFormat { .. } => "MAH-2102",
            Self::Serialization { .. } => "MAH-2103",
            Self::Io { .. } => "MAH-3002",
        }
    }

    /// Whether this error stops the run when it surfaces.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::CorpusDrift { .. }
                | Self::ComparisonMismatch { .. }
                | Self::MissingGenerator { .. }
                | Self::DuplicateKey { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for library binding failures.
    #[must_use]
    pub fn library(context: &'static str, details: impl Into<String>) -> Self {
        Self::Library {
            context,
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for HarnessError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
