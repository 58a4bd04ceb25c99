//! Core capability errors (identifiers, parsing, encoding).
//!
//! These are bounded and stable: they describe bad input, never library
//! implementation details, and they never leave side effects behind.

use thiserror::Error;

use super::json_canon::CanonJsonError;
use crate::error::{Disposition, Effect};

/// Invalid entry identifier or identifier component.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdentifierError {
    #[error("{component} `{value}` contains the reserved delimiter `{delimiter}`")]
    ReservedDelimiter {
        component: &'static str,
        value: String,
        delimiter: char,
    },
    #[error("{component} must not be empty")]
    Empty { component: &'static str },
    #[error("entry id `{raw}` is invalid: {reason}")]
    Malformed { raw: String, reason: String },
}

/// The store file could not be loaded as a whole.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    #[error("store is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("store is missing `schema_version`")]
    MissingSchemaVersion,

    #[error("unsupported schema_version {found} (supported: {supported})")]
    UnsupportedSchema { found: String, supported: u32 },
}

/// Core errors, all of which are pure input failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Canon(#[from] CanonJsonError),

    #[error("invalid timestamp `{raw}`: {reason}")]
    InvalidTimestamp { raw: String, reason: String },

    #[error("failed to encode store: {0}")]
    Encode(#[source] serde_json::Error),
}

impl CoreError {
    pub fn disposition(&self) -> Disposition {
        Disposition::Terminal
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
