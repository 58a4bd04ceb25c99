//! Layer 2: Memory entries
//!
//! Checksum: `sha256:<hex>` over the canonical encoding of `content`
//! EntryMetadata: authorship and clocks
//! MemoryEntry: id + opaque content + metadata + checksum

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::error::CoreError;
use super::identity::{EntryId, SIBLING_TAG_LEN};
use super::json_canon::to_canon_json_bytes;
use super::time::Timestamp;

/// Content checksum, kept as the raw string found on disk.
///
/// Malformed values are representable so the validator can report them
/// instead of the decoder dropping the entry.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    pub const PREFIX: &'static str = "sha256:";

    pub fn compute(content: &Value) -> Result<Self, CoreError> {
        let bytes = to_canon_json_bytes(content)?;
        let digest = Sha256::digest(&bytes);
        Ok(Self(format!("{}{}", Self::PREFIX, hex::encode(digest))))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn hex(&self) -> Option<&str> {
        self.0.strip_prefix(Self::PREFIX)
    }

    pub fn is_well_formed(&self) -> bool {
        self.hex().is_some_and(|hex| {
            hex.len() == 64 && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        })
    }

    /// Leading hex digits used to tag sibling ids.
    pub fn short(&self) -> Option<&str> {
        if !self.is_well_formed() {
            return None;
        }
        self.hex().map(|hex| &hex[..SIBLING_TAG_LEN])
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({:?})", self.0)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryMetadata {
    pub source_host: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub version: u64,
}

/// One memory record.
///
/// `content` is opaque. Only the originating host edits an entry, and
/// edits keep the id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryEntry {
    pub id: EntryId,
    pub content: Value,
    pub metadata: EntryMetadata,
    pub checksum: Checksum,
}

impl MemoryEntry {
    /// First version of a freshly recorded entry.
    pub fn new(
        host: &str,
        original_id: &str,
        created_at: Timestamp,
        content: Value,
    ) -> Result<Self, CoreError> {
        let id = EntryId::generate(host, original_id, created_at)?;
        let checksum = Checksum::compute(&content)?;
        Ok(Self {
            id,
            content,
            metadata: EntryMetadata {
                source_host: host.to_string(),
                created_at,
                updated_at: created_at,
                version: 1,
            },
            checksum,
        })
    }

    /// Local edit: new content, bumped version, monotonic `updated_at`.
    pub fn edit(&mut self, content: Value, now: Timestamp) -> Result<(), CoreError> {
        self.checksum = Checksum::compute(&content)?;
        self.content = content;
        self.metadata.version = self.metadata.version.saturating_add(1);
        self.metadata.updated_at = self.metadata.updated_at.max(now);
        Ok(())
    }

    pub fn source_host(&self) -> &str {
        &self.metadata.source_host
    }

    pub fn updated_at(&self) -> Timestamp {
        self.metadata.updated_at
    }
}
