//! Structural validation of individual entries.

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::core::{Checksum, MalformedEntry, MemoryEntry, MemoryStore, Side, Timestamp};
use crate::error::{Disposition, Effect};

/// One reason an entry is structurally invalid.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    #[error("value could not be decoded as an entry: {reason}")]
    Undecodable { reason: String },

    #[error("checksum `{found}` is not of the form sha256:<64 hex>")]
    ChecksumMalformed { found: String },

    #[error("checksum mismatch: stored {stored}, computed {computed}")]
    ChecksumMismatch { stored: String, computed: String },

    #[error("content cannot be canonically encoded: {reason}")]
    ContentUnencodable { reason: String },

    #[error("metadata.source_host is empty")]
    EmptyHost,

    #[error("id host `{id_host}` does not match metadata.source_host `{source_host}`")]
    HostMismatch {
        id_host: String,
        source_host: String,
    },

    #[error("id timestamp `{id_created_at}` does not match metadata.created_at {created_at}")]
    CreatedAtMismatch {
        id_created_at: String,
        created_at: Timestamp,
    },

    #[error("updated_at {updated_at} precedes created_at {created_at}")]
    UpdatedBeforeCreated {
        created_at: Timestamp,
        updated_at: Timestamp,
    },

    #[error("version must be at least 1")]
    VersionZero,
}

impl ValidationIssue {
    /// Structural issues make an entry unusable and send it to quarantine.
    /// The rest are metadata inconsistencies; the entry still merges.
    pub fn is_structural(&self) -> bool {
        match self {
            ValidationIssue::Undecodable { .. }
            | ValidationIssue::ChecksumMalformed { .. }
            | ValidationIssue::ChecksumMismatch { .. }
            | ValidationIssue::ContentUnencodable { .. }
            | ValidationIssue::EmptyHost => true,
            ValidationIssue::HostMismatch { .. }
            | ValidationIssue::CreatedAtMismatch { .. }
            | ValidationIssue::UpdatedBeforeCreated { .. }
            | ValidationIssue::VersionZero => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) =
            issues.into_iter().partition(ValidationIssue::is_structural);
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn into_result(self, id: impl Into<String>) -> Result<(), ValidationError> {
        if self.valid {
            Ok(())
        } else {
            Err(ValidationError {
                id: id.into(),
                issues: self.errors,
            })
        }
    }
}

/// An entry failed validation. Data-level: the entry is quarantined and the
/// run continues.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("entry {id} failed validation: {}", render_issues(.issues))]
pub struct ValidationError {
    pub id: String,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn disposition(&self) -> Disposition {
        Disposition::Quarantine
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}

fn render_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Recompute the checksum and check metadata consistency with the id.
///
/// Only structural issues make the result invalid; inconsistent metadata is
/// returned as warnings.
pub fn validate_entry(entry: &MemoryEntry) -> ValidationResult {
    let mut issues = Vec::new();

    if !entry.checksum.is_well_formed() {
        issues.push(ValidationIssue::ChecksumMalformed {
            found: entry.checksum.as_str().to_string(),
        });
    } else {
        match Checksum::compute(&entry.content) {
            Ok(computed) if computed != entry.checksum => {
                issues.push(ValidationIssue::ChecksumMismatch {
                    stored: entry.checksum.as_str().to_string(),
                    computed: computed.as_str().to_string(),
                });
            }
            Ok(_) => {}
            Err(e) => issues.push(ValidationIssue::ContentUnencodable {
                reason: e.to_string(),
            }),
        }
    }

    let meta = &entry.metadata;
    let parts = entry.id.parts();
    if meta.source_host.is_empty() {
        issues.push(ValidationIssue::EmptyHost);
    } else if parts.host != meta.source_host {
        issues.push(ValidationIssue::HostMismatch {
            id_host: parts.host.to_string(),
            source_host: meta.source_host.clone(),
        });
    }
    if entry.id.created_at() != Some(meta.created_at) {
        issues.push(ValidationIssue::CreatedAtMismatch {
            id_created_at: parts.created_at.to_string(),
            created_at: meta.created_at,
        });
    }
    if meta.updated_at < meta.created_at {
        issues.push(ValidationIssue::UpdatedBeforeCreated {
            created_at: meta.created_at,
            updated_at: meta.updated_at,
        });
    }
    if meta.version == 0 {
        issues.push(ValidationIssue::VersionZero);
    }

    ValidationResult::from_issues(issues)
}

/// An entry set aside by a merge, kept verbatim with its reasons.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RejectedEntry {
    pub key: String,
    pub side: Side,
    pub raw: Value,
    pub reasons: Vec<ValidationIssue>,
}

impl RejectedEntry {
    pub fn from_entry(entry: &MemoryEntry, side: Side, reasons: Vec<ValidationIssue>) -> Self {
        Self {
            key: entry.id.to_string(),
            side,
            raw: json!({
                "content": entry.content,
                "metadata": entry.metadata,
                "checksum": entry.checksum,
            }),
            reasons,
        }
    }

    pub fn from_malformed(malformed: MalformedEntry, side: Side) -> Self {
        Self {
            key: malformed.key,
            side,
            raw: malformed.raw,
            reasons: vec![ValidationIssue::Undecodable {
                reason: malformed.reason,
            }],
        }
    }
}

/// Split a parsed store into valid entries (including shadowed copies) and
/// rejected ones.
pub fn screen_store(store: MemoryStore, side: Side) -> (Vec<MemoryEntry>, Vec<RejectedEntry>) {
    let (entries, shadowed, malformed) = store.into_parts();
    let mut valid = Vec::with_capacity(entries.len() + shadowed.len());
    let mut rejected: Vec<RejectedEntry> = malformed
        .into_iter()
        .map(|m| RejectedEntry::from_malformed(m, side))
        .collect();

    for entry in entries.into_iter().chain(shadowed) {
        let result = validate_entry(&entry);
        if result.valid {
            if !result.warnings.is_empty() {
                tracing::warn!(
                    id = %entry.id,
                    side = side.as_str(),
                    warnings = %render_issues(&result.warnings),
                    "entry metadata is inconsistent; merging it anyway"
                );
            }
            valid.push(entry);
        } else {
            tracing::warn!(
                id = %entry.id,
                side = side.as_str(),
                issues = result.errors.len(),
                "quarantining invalid entry"
            );
            rejected.push(RejectedEntry::from_entry(&entry, side, result.errors));
        }
    }
    (valid, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntryId, parse_store};
    use serde_json::json;

    fn ts(ms: i64) -> Timestamp {
        Timestamp::from_unix_millis(ms).unwrap()
    }

    fn entry() -> MemoryEntry {
        MemoryEntry::new("laptop", "n1", ts(1_000), json!({"fact": "rust"})).unwrap()
    }

    #[test]
    fn fresh_entries_are_valid() {
        let result = validate_entry(&entry());
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.into_result("x").is_ok());
    }

    #[test]
    fn tampered_content_fails_checksum() {
        let mut e = entry();
        e.content = json!({"fact": "go"});
        let result = validate_entry(&e);
        assert!(!result.valid);
        assert!(matches!(
            result.errors.as_slice(),
            [ValidationIssue::ChecksumMismatch { .. }]
        ));
    }

    #[test]
    fn malformed_checksum_is_reported_once() {
        let mut e = entry();
        e.checksum = Checksum::from_raw("md5:abc");
        let result = validate_entry(&e);
        assert_eq!(
            result.errors,
            vec![ValidationIssue::ChecksumMalformed {
                found: "md5:abc".into()
            }]
        );
    }

    #[test]
    fn metadata_must_agree_with_the_id() {
        let mut e = entry();
        e.metadata.source_host = "desktop".into();
        e.metadata.created_at = ts(2_000);
        e.metadata.updated_at = ts(1_500);
        e.metadata.version = 0;
        let result = validate_entry(&e);
        assert!(result.valid);
        assert!(result.errors.is_empty());
        let kinds: Vec<_> = result
            .warnings
            .iter()
            .map(|i| serde_json::to_value(i).unwrap()["kind"].clone())
            .collect();
        assert_eq!(
            kinds,
            vec![
                json!("host_mismatch"),
                json!("created_at_mismatch"),
                json!("updated_before_created"),
                json!("version_zero"),
            ]
        );
    }

    #[test]
    fn empty_host_is_reported() {
        let mut e = entry();
        e.metadata.source_host.clear();
        let result = validate_entry(&e);
        assert!(result.errors.contains(&ValidationIssue::EmptyHost));
    }

    #[test]
    fn sibling_ids_validate_against_their_base() {
        let mut e = entry();
        e.id = e.id.sibling(e.checksum.short().unwrap()).unwrap();
        assert!(validate_entry(&e).valid);
    }

    #[test]
    fn validation_error_is_quarantine() {
        let mut e = entry();
        e.metadata.source_host.clear();
        let err = validate_entry(&e).into_result(e.id.as_str()).unwrap_err();
        assert_eq!(err.disposition(), Disposition::Quarantine);
        assert!(err.to_string().contains("metadata.source_host is empty"));
    }

    #[test]
    fn inconsistent_metadata_is_kept_with_a_valid_checksum() {
        let mut skewed = entry();
        skewed.metadata.created_at = ts(5_000);
        skewed.metadata.version = 0;
        let store = MemoryStore::from_entries([skewed.clone()]);
        let (valid, rejected) = screen_store(store, Side::Remote);
        assert_eq!(valid, vec![skewed]);
        assert!(rejected.is_empty());
    }

    #[test]
    fn screen_store_separates_bad_entries() {
        let good = entry();
        let mut bad = MemoryEntry::new("laptop", "n2", ts(0), json!(1)).unwrap();
        bad.content = json!(2);
        let mut store = MemoryStore::from_entries([good.clone(), bad.clone()]);
        store.push_malformed(MalformedEntry {
            key: "junk".into(),
            raw: json!([1, 2, 3]),
            reason: "not an object".into(),
        });

        let (valid, rejected) = screen_store(store, Side::Remote);
        assert_eq!(valid, vec![good]);
        assert_eq!(rejected.len(), 2);
        assert_eq!(rejected[0].key, "junk");
        assert_eq!(rejected[0].raw, json!([1, 2, 3]));
        assert_eq!(rejected[1].key, bad.id.as_str());
        assert_eq!(rejected[1].side, Side::Remote);
        assert_eq!(rejected[1].raw["content"], json!(2));
    }

    #[test]
    fn screen_store_keeps_valid_shadowed_copies() {
        let first = entry();
        let mut second = first.clone();
        second.edit(json!("newer"), ts(5_000)).unwrap();
        let store = MemoryStore::from_entries([first.clone(), second.clone()]);
        let (valid, rejected) = screen_store(store, Side::Local);
        assert!(rejected.is_empty());
        assert_eq!(valid, vec![first, second]);
    }

    #[test]
    fn undecodable_values_become_rejections() {
        let raw = br#"{"schema_version":1,"entries":{"h:x:20240101T000000.000000000Z":{"content":1}}}"#;
        let store = parse_store(raw).unwrap();
        let (valid, rejected) = screen_store(store, Side::Local);
        assert!(valid.is_empty());
        assert!(matches!(
            rejected[0].reasons.as_slice(),
            [ValidationIssue::Undecodable { .. }]
        ));
        assert!(EntryId::parse(&rejected[0].key).is_ok());
    }
}
