//! Last-write-wins ordering and the tie-break policy.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::MemoryEntry;

/// What happens to versions tied on `updated_at` with the winner.
///
/// Every replica must run the same policy or the merge stops converging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakPolicy {
    /// The lexicographically greater `source_host` wins; the rest are
    /// superseded.
    #[default]
    HostLexicographic,
    /// The winner keeps the id; tied versions with other content are kept
    /// under sibling ids.
    PreserveSiblings,
}

impl TieBreakPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            TieBreakPolicy::HostLexicographic => "host_lexicographic",
            TieBreakPolicy::PreserveSiblings => "preserve_siblings",
        }
    }
}

impl fmt::Display for TieBreakPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TieBreakPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "host_lexicographic" | "host" | "lww" => Ok(TieBreakPolicy::HostLexicographic),
            "preserve_siblings" | "siblings" => Ok(TieBreakPolicy::PreserveSiblings),
            other => Err(format!(
                "unknown tie-break policy `{other}` (expected host_lexicographic or preserve_siblings)"
            )),
        }
    }
}

/// The key that decided between two versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionRule {
    UpdatedAt,
    SourceHost,
    Version,
    Checksum,
    CreatedAt,
}

/// Total LWW order: `(updated_at, source_host, version, checksum, created_at)`.
pub fn lww_cmp(a: &MemoryEntry, b: &MemoryEntry) -> Ordering {
    decide(a, b).0
}

/// Compare two versions and report which key decided.
pub fn decide(a: &MemoryEntry, b: &MemoryEntry) -> (Ordering, Option<ResolutionRule>) {
    let (ma, mb) = (&a.metadata, &b.metadata);
    let steps = [
        (ma.updated_at.cmp(&mb.updated_at), ResolutionRule::UpdatedAt),
        (ma.source_host.cmp(&mb.source_host), ResolutionRule::SourceHost),
        (ma.version.cmp(&mb.version), ResolutionRule::Version),
        (a.checksum.cmp(&b.checksum), ResolutionRule::Checksum),
        (ma.created_at.cmp(&mb.created_at), ResolutionRule::CreatedAt),
    ];
    steps
        .into_iter()
        .find(|(ord, _)| ord.is_ne())
        .map_or((Ordering::Equal, None), |(ord, rule)| (ord, Some(rule)))
}
