//! CRDT merge of memory stores.

pub mod engine;
pub mod operation;
pub mod policy;

pub use engine::{MergeEngine, merge};
pub use operation::{ConflictCandidate, ConflictRecord, MergeOperation, MergeStats};
pub use policy::{ResolutionRule, TieBreakPolicy, decide, lww_cmp};
