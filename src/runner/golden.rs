//! Golden specification documents and their on-disk JSON form.
//!
//! A generate run writes a spec wholesale; verify runs only read it. Every
//! map keeps insertion order in both directions so the generating run
//! decides the layout of the file.

#![allow(missing_docs)]

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::archiver::library::AttachmentDescriptor;
use crate::core::errors::{HarnessError, Result};

/// String-keyed map that preserves insertion order.
///
/// Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut map = OrderedMap::new();
        while let Some((k, v)) = access.next_entry::<String, V>()? {
            map.insert(k, v);
        }
        Ok(map)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

/// Provenance of a generator spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorArgs {
    /// The command line that produced the spec.
    pub cmd: String,
}

/// One recorded generator result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorRecord {
    pub index: usize,
    #[serde(rename = "message-id")]
    pub message_id: String,
    pub generated: String,
    /// Second accepted mid for messages whose id is known to vary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate: Option<String>,
}

/// `corpus path -> generator name -> records`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorSpec {
    pub args: GeneratorArgs,
    pub generators: OrderedMap<OrderedMap<Vec<GeneratorRecord>>>,
}

/// Provenance of a parsing spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsingArgs {
    pub cmd: String,
    #[serde(default)]
    pub parse_html: bool,
}

/// One recorded parsing result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsingRecord {
    pub index: usize,
    #[serde(rename = "message-id")]
    pub message_id: String,
    /// Hex SHA3-256 of the UTF-8 body; `null` when the archiver found no body.
    pub body_sha3_256: Option<String>,
    /// A recorded `null` or absent list reads as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub attachments: Vec<AttachmentDescriptor>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// `corpus path -> records`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsingSpec {
    pub args: ParsingArgs,
    pub parsing: OrderedMap<Vec<ParsingRecord>>,
}

/// Which runner a spec document belongs to, by its top-level section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecKind {
    Generators,
    Parsing,
}

impl SpecKind {
    #[must_use]
    pub const fn section(self) -> &'static str {
        match self {
            Self::Generators => "generators",
            Self::Parsing => "parsing",
        }
    }
}

/// Read and decode a spec document.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|source| HarnessError::io(path, source))?;
    serde_json::from_slice(&bytes).map_err(|e| HarnessError::GoldenFormat {
        path: path.to_path_buf(),
        details: e.to_string(),
    })
}

/// Write a spec document as pretty JSON with a trailing newline, replacing
/// any previous file.
pub fn save<T: Serialize>(path: &Path, spec: &T) -> Result<()> {
    let mut text = serde_json::to_string_pretty(spec)?;
    text.push('\n');
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| HarnessError::io(parent, source))?;
    }
    std::fs::write(path, text).map_err(|source| HarnessError::io(path, source))
}

/// Top-level sections present in a spec file, in the order the runners
/// handle them.
pub fn sections(path: &Path) -> Result<Vec<SpecKind>> {
    let doc: OrderedMap<serde::de::IgnoredAny> = load(path)?;
    let mut kinds = Vec::new();
    for kind in [SpecKind::Generators, SpecKind::Parsing] {
        if doc.get(kind.section()).is_some() {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}
