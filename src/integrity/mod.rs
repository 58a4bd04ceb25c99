//! Per-entry integrity: validation, deduplication, and the on-disk safety
//! net (pre-merge backups, quarantine files, merge drafts).

pub mod backup;
pub mod dedupe;
pub mod error;
pub mod validate;

pub use backup::{BackupHandle, preserve_draft, pre_merge_backup, quarantine_rejected};
pub use dedupe::{dedupe_store, deduplicate};
pub use error::IntegrityError;
pub use validate::{
    RejectedEntry, ValidationError, ValidationIssue, ValidationResult, screen_store,
    validate_entry,
};
