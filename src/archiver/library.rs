//! Collaborator interface of the archiving library under test.
//!
//! A library declares its interface once through [`LibraryDescriptor`];
//! every call afterwards is one of the explicit per-shape variants below, so
//! neither side ever has to guess an arity.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::errors::Result;
use crate::corpus::message::RawMessage;

/// Argument bundle the newer compute shapes take. The harness always passes
/// the default (`verbose = false`, no `ibody`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeArgs {
    pub verbose: bool,
    pub ibody: Option<String>,
}

/// One attachment as the archiver records it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub content_type: String,
    pub filename: String,
    pub hash: String,
    pub size: u64,
}

/// Normalized output of one `compute` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeResult {
    pub mid: String,
    /// `None` when the message had no extractable text.
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentDescriptor>,
}

/// What a library says about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDescriptor {
    /// Keyword arguments the constructor accepts.
    pub constructor_keywords: Vec<String>,
    /// Parameter names of `compute_updates`, in order.
    pub compute_parameters: Vec<String>,
    /// Whether a library-level generator selector exists.
    #[serde(default)]
    pub generator_selector: bool,
    /// Generator names the library implements.
    #[serde(default)]
    pub generators: Vec<String>,
}

/// Constructor keywords, one variant per constructor shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "kebab-case")]
pub enum ConstructorKeywords {
    Oldest {
        #[serde(rename = "parseHTML")]
        parse_html: bool,
    },
    Transitional {
        generator: Option<String>,
        parse_html: bool,
        ignore_body: Option<String>,
    },
    Current {
        #[serde(skip_serializing_if = "Option::is_none")]
        generator: Option<String>,
        parse_html: bool,
    },
}

/// Everything needed to build one library instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorCall {
    pub keywords: ConstructorKeywords,
    /// Generator chosen through the library-level selector, when that is the channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_selector: Option<String>,
}

/// `compute_updates` arguments, one variant per compute shape.
#[derive(Debug, Clone, Copy)]
pub enum ComputeCall<'a> {
    Current {
        args: &'a FakeArgs,
        list_id: &'a str,
        private: bool,
        message: &'a RawMessage<'a>,
        raw: &'a [u8],
    },
    Interim {
        list_id: &'a str,
        private: bool,
        message: &'a RawMessage<'a>,
        raw: &'a [u8],
    },
    ArgsOnly {
        args: &'a FakeArgs,
        list_id: &'a str,
        private: bool,
        message: &'a RawMessage<'a>,
    },
    Legacy {
        list_id: &'a str,
        private: bool,
        message: &'a RawMessage<'a>,
    },
}

impl<'a> ComputeCall<'a> {
    #[must_use]
    pub const fn list_id(&self) -> &'a str {
        match self {
            Self::Current { list_id, .. }
            | Self::Interim { list_id, .. }
            | Self::ArgsOnly { list_id, .. }
            | Self::Legacy { list_id, .. } => *list_id,
        }
    }

    #[must_use]
    pub const fn message(&self) -> &'a RawMessage<'a> {
        match self {
            Self::Current { message, .. }
            | Self::Interim { message, .. }
            | Self::ArgsOnly { message, .. }
            | Self::Legacy { message, .. } => *message,
        }
    }

    /// The raw-message argument, for the shapes that take one.
    #[must_use]
    pub const fn raw(&self) -> Option<&'a [u8]> {
        match self {
            Self::Current { raw, .. } | Self::Interim { raw, .. } => Some(*raw),
            Self::ArgsOnly { .. } | Self::Legacy { .. } => None,
        }
    }

    #[must_use]
    pub const fn private(&self) -> bool {
        match self {
            Self::Current { private, .. }
            | Self::Interim { private, .. }
            | Self::ArgsOnly { private, .. }
            | Self::Legacy { private, .. } => *private,
        }
    }
}

/// `compute_updates` return value by arity.
#[derive(Debug, Clone, PartialEq)]
pub enum ComputeReturn {
    /// Four values: document, attachment contents, message metadata, in-reply-to.
    Full {
        document: Option<ComputeResult>,
        contents: BTreeMap<String, String>,
        metadata: serde_json::Value,
        in_reply_to: Option<String>,
    },
    /// Two values: document, attachment contents.
    Pair {
        document: Option<ComputeResult>,
        contents: BTreeMap<String, String>,
    },
}

impl ComputeReturn {
    #[must_use]
    pub const fn arity(&self) -> usize {
        match self {
            Self::Full { .. } => 4,
            Self::Pair { .. } => 2,
        }
    }

    /// The first returned value.
    #[must_use]
    pub fn into_document(self) -> Option<ComputeResult> {
        match self {
            Self::Full { document, .. } | Self::Pair { document, .. } => document,
        }
    }
}

/// A loaded archiving library.
pub trait ArchiverLibrary {
    /// Declared interface and implemented generators.
    fn describe(&mut self) -> Result<LibraryDescriptor>;

    /// The library's List-ID normaliser.
    fn normalize_lid(&mut self, raw: &str) -> Result<String>;

    /// Build an instance with the given constructor call.
    fn instantiate(&mut self, call: &ConstructorCall) -> Result<Box<dyn ArchiverInstance>>;
}

/// One constructed archiver.
pub trait ArchiverInstance {
    fn compute_updates(&mut self, call: ComputeCall<'_>) -> Result<ComputeReturn>;
}
