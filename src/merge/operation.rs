//! The result of one merge and its audit trail.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use super::policy::{ResolutionRule, TieBreakPolicy};
use crate::core::{Checksum, EntryId, EntryMetadata, MemoryEntry, MemoryStore, Side};
use crate::integrity::RejectedEntry;

/// One distinct version that took part in a conflict, kept whole so the
/// losing content stays recoverable from the audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConflictCandidate {
    pub sides: Vec<Side>,
    pub content: Value,
    pub metadata: EntryMetadata,
    pub checksum: Checksum,
}

impl ConflictCandidate {
    pub(crate) fn describe(entry: &MemoryEntry, sides: Vec<Side>) -> Self {
        Self {
            sides,
            content: entry.content.clone(),
            metadata: entry.metadata.clone(),
            checksum: entry.checksum.clone(),
        }
    }

    pub fn source_host(&self) -> &str {
        &self.metadata.source_host
    }

    /// The version as an entry stored under `id`.
    pub fn to_entry(&self, id: EntryId) -> MemoryEntry {
        MemoryEntry {
            id,
            content: self.content.clone(),
            metadata: self.metadata.clone(),
            checksum: self.checksum.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConflictRecord {
    pub id: EntryId,
    /// Every distinct version seen, oldest first in LWW order.
    pub candidates: Vec<ConflictCandidate>,
    pub winner: ConflictCandidate,
    /// Sibling ids created for tied versions.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub siblings: Vec<EntryId>,
    /// Incoming sibling ids displaced by a newer version. Their content is
    /// among `candidates`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub superseded: Vec<EntryId>,
    /// Key that separated the winner from the best version with other content.
    pub rule: Option<ResolutionRule>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOperation {
    pub merged: MemoryStore,
    pub entries_added: Vec<EntryId>,
    pub entries_resolved: Vec<EntryId>,
    pub entries_unchanged: Vec<EntryId>,
    pub rejected_entries: Vec<RejectedEntry>,
    pub conflicts_detected: Vec<ConflictRecord>,
    pub policy: TieBreakPolicy,
}

impl MergeOperation {
    pub(crate) fn new(policy: TieBreakPolicy) -> Self {
        Self {
            merged: MemoryStore::new(),
            entries_added: Vec::new(),
            entries_resolved: Vec::new(),
            entries_unchanged: Vec::new(),
            rejected_entries: Vec::new(),
            conflicts_detected: Vec::new(),
            policy,
        }
    }

    pub fn stats(&self) -> MergeStats {
        MergeStats {
            added: self.entries_added.len(),
            resolved: self.entries_resolved.len(),
            unchanged: self.entries_unchanged.len(),
            rejected: self.rejected_entries.len(),
            conflicts: self.conflicts_detected.len(),
            total: self.merged.len(),
        }
    }

    /// Hosts that authored anything in the merged store.
    pub fn hosts(&self) -> BTreeSet<String> {
        self.merged.hosts().into_iter().map(str::to_owned).collect()
    }

    pub fn has_rejections(&self) -> bool {
        !self.rejected_entries.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub added: usize,
    pub resolved: usize,
    pub unchanged: usize,
    pub rejected: usize,
    pub conflicts: usize,
    pub total: usize,
}
