//! State-based merge of two memory stores.
//!
//! Each id's result depends only on the set of valid versions seen for it,
//! picked by a total order, so the merge is a join: commutative,
//! associative and idempotent.

use std::collections::{BTreeMap, BTreeSet};

use super::operation::{ConflictCandidate, ConflictRecord, MergeOperation};
use super::policy::{TieBreakPolicy, decide, lww_cmp};
use crate::core::{Checksum, EntryId, MemoryEntry, MemoryStore, Side};
use crate::integrity::{dedupe_store, screen_store};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeEngine {
    policy: TieBreakPolicy,
}

/// Merge with the default policy.
pub fn merge(local: &MemoryStore, remote: &MemoryStore) -> MergeOperation {
    MergeEngine::default().merge(local, remote)
}

impl MergeEngine {
    pub fn new(policy: TieBreakPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> TieBreakPolicy {
        self.policy
    }

    pub fn merge(&self, local: &MemoryStore, remote: &MemoryStore) -> MergeOperation {
        let mut op = MergeOperation::new(self.policy);
        let mut groups: BTreeMap<EntryId, Vec<(Side, MemoryEntry)>> = BTreeMap::new();

        for (side, store) in [(Side::Local, local), (Side::Remote, remote)] {
            let mut store = store.clone();
            dedupe_store(&mut store);
            let (valid, rejected) = screen_store(store, side);
            op.rejected_entries.extend(rejected);
            for entry in valid {
                groups
                    .entry(self.group_key(&entry.id))
                    .or_default()
                    .push((side, entry));
            }
        }

        for (id, tagged) in groups {
            self.resolve(id, tagged, &mut op);
        }

        tracing::debug!(
            policy = %self.policy,
            added = op.entries_added.len(),
            resolved = op.entries_resolved.len(),
            unchanged = op.entries_unchanged.len(),
            rejected = op.rejected_entries.len(),
            "merge complete"
        );
        op
    }

    /// Siblings only fold back into their base id when this policy made them.
    fn group_key(&self, id: &EntryId) -> EntryId {
        match self.policy {
            TieBreakPolicy::HostLexicographic => id.clone(),
            TieBreakPolicy::PreserveSiblings => id.base(),
        }
    }

    fn resolve(&self, id: EntryId, tagged: Vec<(Side, MemoryEntry)>, op: &mut MergeOperation) {
        let in_local = tagged.iter().any(|(side, e)| *side == Side::Local && e.id == id);
        let in_remote = tagged.iter().any(|(side, e)| *side == Side::Remote && e.id == id);
        // disagreement under the id itself; siblings already resolved agree
        let disputed = tagged
            .iter()
            .filter(|(_, e)| e.id == id)
            .map(|(_, e)| &e.checksum)
            .collect::<BTreeSet<_>>()
            .len()
            > 1;
        let incoming_siblings: BTreeSet<EntryId> = tagged
            .iter()
            .filter(|(_, e)| e.id != id)
            .map(|(_, e)| e.id.clone())
            .collect();

        let mut versions: Vec<(MemoryEntry, Vec<Side>)> = Vec::new();
        for (side, mut entry) in tagged {
            entry.id = id.clone();
            match versions.iter_mut().find(|(known, _)| *known == entry) {
                Some((_, sides)) => {
                    if !sides.contains(&side) {
                        sides.push(side);
                    }
                }
                None => versions.push((entry, vec![side])),
            }
        }
        versions.sort_by(|a, b| lww_cmp(&a.0, &b.0));

        let Some((winner, _)) = versions.last() else {
            return;
        };
        let winner = winner.clone();

        let siblings = if self.policy == TieBreakPolicy::PreserveSiblings {
            self.keep_tied(&id, &winner, &versions, op)
        } else {
            Vec::new()
        };
        let superseded: Vec<EntryId> = incoming_siblings
            .iter()
            .filter(|sibling| !siblings.contains(sibling))
            .cloned()
            .collect();

        if !disputed && superseded.is_empty() {
            if in_local && in_remote {
                op.entries_unchanged.push(id);
            } else {
                op.entries_added.push(id);
            }
            op.merged.insert(winner);
            return;
        }

        let runner_up = versions
            .iter()
            .rev()
            .map(|(e, _)| e)
            .find(|e| e.checksum != winner.checksum);
        let rule = runner_up.and_then(|r| decide(&winner, r).1);

        let record = ConflictRecord {
            id: id.clone(),
            candidates: versions
                .iter()
                .map(|(e, sides)| ConflictCandidate::describe(e, sorted(sides)))
                .collect(),
            winner: ConflictCandidate::describe(
                &winner,
                versions.last().map(|(_, s)| sorted(s)).unwrap_or_default(),
            ),
            siblings,
            superseded,
            rule,
        };
        tracing::debug!(
            id = %id,
            candidates = record.candidates.len(),
            rule = ?record.rule,
            siblings = record.siblings.len(),
            superseded = record.superseded.len(),
            "conflict resolved"
        );

        op.entries_resolved.push(id);
        op.conflicts_detected.push(record);
        op.merged.insert(winner);
    }

    /// Store versions tied with the winner under sibling ids; returns the
    /// ids, sorted.
    fn keep_tied(
        &self,
        id: &EntryId,
        winner: &MemoryEntry,
        versions: &[(MemoryEntry, Vec<Side>)],
        op: &mut MergeOperation,
    ) -> Vec<EntryId> {
        let mut seen: BTreeSet<&Checksum> = BTreeSet::new();
        seen.insert(&winner.checksum);
        let mut siblings = Vec::new();
        // newest first, so the first version per checksum is its best
        for (version, _) in versions.iter().rev() {
            if version.metadata.updated_at != winner.metadata.updated_at
                || !seen.insert(&version.checksum)
            {
                continue;
            }
            let Some(tag) = version.checksum.short() else {
                continue;
            };
            match id.sibling(tag) {
                Ok(sibling_id) => {
                    let mut sibling = version.clone();
                    sibling.id = sibling_id.clone();
                    op.merged.insert(sibling);
                    siblings.push(sibling_id);
                }
                Err(e) => {
                    tracing::error!(id = %id, error = %e, "failed to derive sibling id");
                }
            }
        }
        siblings.sort();
        siblings
    }
}

fn sorted(sides: &[Side]) -> Vec<Side> {
    let mut sides = sides.to_vec();
    sides.sort();
    sides
}
