//! Layer 3: MemoryStore and its on-disk format
//!
//! ```json
//! { "schema_version": 1, "entries": { "<id>": { "content": ..., "metadata": {...}, "checksum": "sha256:..." } } }
//! ```
//!
//! Decoding keeps every occurrence of an entry key: the first valid one is
//! the entry, later ones are `shadowed`, undecodable ones are `malformed`.
//! None of them are lost; the merge resolves or quarantines them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::entry::{Checksum, EntryMetadata, MemoryEntry};
use super::error::{CoreError, ParseError};
use super::identity::EntryId;
use super::json_canon::canon_value;

pub const SCHEMA_VERSION: u32 = 1;

/// Which input a value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Local,
    Remote,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Local => "local",
            Side::Remote => "remote",
        }
    }
}

/// An entry value that could not be decoded, kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MalformedEntry {
    pub key: String,
    pub raw: Value,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryStore {
    entries: BTreeMap<EntryId, MemoryEntry>,
    shadowed: Vec<MemoryEntry>,
    malformed: Vec<MalformedEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store; repeated ids after the first are shadowed.
    pub fn from_entries(entries: impl IntoIterator<Item = MemoryEntry>) -> Self {
        let mut store = Self::new();
        for entry in entries {
            store.ingest(entry);
        }
        store
    }

    /// Insert or replace the entry under its id.
    pub fn insert(&mut self, entry: MemoryEntry) -> Option<MemoryEntry> {
        self.entries.insert(entry.id.clone(), entry)
    }

    /// Insert unless the id is taken, in which case the entry is shadowed.
    pub fn ingest(&mut self, entry: MemoryEntry) {
        if self.entries.contains_key(&entry.id) {
            self.shadowed.push(entry);
        } else {
            self.entries.insert(entry.id.clone(), entry);
        }
    }

    pub fn push_malformed(&mut self, malformed: MalformedEntry) {
        self.malformed.push(malformed);
    }

    pub fn get(&self, id: &EntryId) -> Option<&MemoryEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &EntryId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntryId> {
        self.entries.keys()
    }

    pub fn shadowed(&self) -> &[MemoryEntry] {
        &self.shadowed
    }

    pub fn malformed(&self) -> &[MalformedEntry] {
        &self.malformed
    }

    /// Distinct `source_host` values across entries and shadowed entries.
    pub fn hosts(&self) -> BTreeSet<&str> {
        self.entries
            .values()
            .chain(self.shadowed.iter())
            .map(|e| e.source_host())
            .collect()
    }

    pub fn into_parts(self) -> (Vec<MemoryEntry>, Vec<MemoryEntry>, Vec<MalformedEntry>) {
        (
            self.entries.into_values().collect(),
            self.shadowed,
            self.malformed,
        )
    }

    pub(crate) fn take_shadowed(&mut self) -> Vec<MemoryEntry> {
        std::mem::take(&mut self.shadowed)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireEntry {
    content: Value,
    metadata: EntryMetadata,
    checksum: Checksum,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireStore {
    schema_version: Option<Value>,
    #[serde(default)]
    entries: WireEntries,
}

#[derive(Default)]
struct WireEntries(MemoryStore);

impl<'de> Deserialize<'de> for WireEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(WireEntriesVisitor)
    }
}

struct WireEntriesVisitor;

impl<'de> Visitor<'de> for WireEntriesVisitor {
    type Value = WireEntries;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping entry ids to entries")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut store = MemoryStore::new();
        while let Some(key) = map.next_key::<String>()? {
            let raw: Value = map.next_value()?;
            match decode_entry(&key, &raw) {
                Ok(entry) => store.ingest(entry),
                Err(reason) => store.push_malformed(MalformedEntry { key, raw, reason }),
            }
        }
        Ok(WireEntries(store))
    }
}

fn decode_entry(key: &str, raw: &Value) -> Result<MemoryEntry, String> {
    let id = EntryId::parse(key).map_err(|e| e.to_string())?;
    let wire = WireEntry::deserialize(raw).map_err(|e| e.to_string())?;
    Ok(MemoryEntry {
        id,
        content: wire.content,
        metadata: wire.metadata,
        checksum: wire.checksum,
    })
}

/// Parse a store file. All-or-nothing at the file level; individual bad
/// entries are kept as `malformed`. Blank input is an empty store.
pub fn parse_store(bytes: &[u8]) -> Result<MemoryStore, ParseError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(MemoryStore::new());
    }
    let wire: WireStore = serde_json::from_slice(bytes).map_err(ParseError::InvalidJson)?;
    match wire.schema_version {
        None => Err(ParseError::MissingSchemaVersion),
        Some(v) if v.as_u64() == Some(u64::from(SCHEMA_VERSION)) => Ok(wire.entries.0),
        Some(v) => Err(ParseError::UnsupportedSchema {
            found: v.to_string(),
            supported: SCHEMA_VERSION,
        }),
    }
}

#[derive(Serialize)]
struct WireEntryRef<'a> {
    content: Value,
    metadata: &'a EntryMetadata,
    checksum: &'a Checksum,
}

#[derive(Serialize)]
struct WireStoreRef<'a> {
    schema_version: u32,
    entries: BTreeMap<&'a str, WireEntryRef<'a>>,
}

/// Serialize entries sorted by id, pretty printed, newline terminated.
///
/// Shadowed and malformed values are not written; they only exist until
/// the merge has dealt with them.
pub fn serialize_store(store: &MemoryStore) -> Result<Vec<u8>, CoreError> {
    let entries = store
        .iter()
        .map(|e| {
            (
                e.id.as_str(),
                WireEntryRef {
                    content: canon_value(e.content.clone()),
                    metadata: &e.metadata,
                    checksum: &e.checksum,
                },
            )
        })
        .collect();
    let wire = WireStoreRef {
        schema_version: SCHEMA_VERSION,
        entries,
    };
    let mut out = serde_json::to_vec_pretty(&wire).map_err(CoreError::Encode)?;
    out.push(b'\n');
    Ok(out)
}
