//! Core domain types.
//!
//! Module hierarchy follows type dependency order:
//! - time: UTC timestamps (Layer 0)
//! - identity: EntryId (Layer 1)
//! - json_canon: canonical content encoding (Layer 1)
//! - entry: Checksum, EntryMetadata, MemoryEntry (Layer 2)
//! - store: MemoryStore and its file format (Layer 3)

pub mod entry;
pub mod error;
pub mod identity;
pub mod json_canon;
pub mod store;
pub mod time;

pub use entry::{Checksum, EntryMetadata, MemoryEntry};
pub use error::{CoreError, IdentifierError, ParseError};
pub use identity::{EntryId, ID_DELIMITER, SIBLING_MARKER, generate_id};
pub use json_canon::{CanonJsonError, to_canon_json_bytes};
pub use store::{
    MalformedEntry, MemoryStore, SCHEMA_VERSION, Side, parse_store, serialize_store,
};
pub use time::Timestamp;
