//! Exact-duplicate removal.
//!
//! Two entries are duplicates only when they are equal in every field.
//! Entries that merely share an id are left for the merge to resolve.

use crate::core::{MemoryEntry, MemoryStore};

/// Drop exact repeats, keeping the first occurrence and the input order.
pub fn deduplicate(entries: Vec<MemoryEntry>) -> Vec<MemoryEntry> {
    let mut kept: Vec<MemoryEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if !kept.contains(&entry) {
            kept.push(entry);
        }
    }
    kept
}

/// Drop shadowed copies identical to the primary entry or to an earlier
/// shadowed copy. Returns how many were removed.
pub fn dedupe_store(store: &mut MemoryStore) -> usize {
    let shadowed = store.take_shadowed();
    let before = shadowed.len();
    let mut kept: Vec<MemoryEntry> = Vec::with_capacity(shadowed.len());
    for copy in shadowed {
        if store.get(&copy.id) != Some(&copy) && !kept.contains(&copy) {
            kept.push(copy);
        }
    }
    let removed = before - kept.len();
    if removed > 0 {
        tracing::debug!(removed, "dropped exact duplicate entries");
    }
    for copy in kept {
        store.ingest(copy);
    }
    removed
}
