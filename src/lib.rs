#![forbid(unsafe_code)]

//! Lossless reconciliation of shared memory stores over git.
//!
//! Layers, leaf-first:
//! - `core`: entry ids, entries, the store file format
//! - `integrity`: per-entry validation, dedupe, backups, quarantine
//! - `merge`: the CRDT merge engine
//! - `git`: the fetch/merge/commit/push controller
//! - `backup`: the end-to-end workflow and its report

pub mod backup;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod git;
pub mod integrity;
pub mod merge;
pub mod paths;
pub mod telemetry;
pub mod test_harness;

pub use error::{Disposition, Effect, Error};
pub type Result<T> = std::result::Result<T, Error>;

pub use crate::backup::{BackupManager, BackupReport, ReportStatus, WorkflowOptions};
pub use crate::core::{
    Checksum, EntryId, EntryMetadata, MemoryEntry, MemoryStore, Side, Timestamp, generate_id,
    parse_store, serialize_store,
};
pub use crate::git::{Git2Remote, GitRemote, RetryPolicy, SyncError};
pub use crate::merge::{MergeEngine, MergeOperation, TieBreakPolicy, merge};
