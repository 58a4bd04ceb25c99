use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::core::CoreError;
use crate::git::SyncError;
use crate::integrity::IntegrityError;

/// How the workflow treats an error once it surfaces.
#[derive(Debug, Copy, Clone, Eq, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Retry may help (network outage, lost push race).
    Retryable,
    /// Stop the run; a human has to look at it.
    Terminal,
    /// Set the offending entry aside and keep going.
    Quarantine,
}

impl Disposition {
    pub fn is_retryable(self) -> bool {
        matches!(self, Disposition::Retryable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Retryable => "retryable",
            Disposition::Terminal => "terminal",
            Disposition::Quarantine => "quarantine",
        }
    }
}

/// What we know about side effects when an error is returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Definitely no side effects occurred.
    None,
    /// Side effects definitely occurred (locally or remotely).
    Some,
    /// We don't know if side effects occurred.
    Unknown,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::None => "none",
            Effect::Some => "some",
            Effect::Unknown => "unknown",
        }
    }
}

/// Crate-level convenience error.
///
/// A thin wrapper over the capability errors; each keeps its own
/// disposition and effect.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn disposition(&self) -> Disposition {
        match self {
            Error::Core(e) => e.disposition(),
            Error::Integrity(e) => e.disposition(),
            Error::Sync(e) => e.disposition(),
            Error::Config(_) | Error::Io { .. } => Disposition::Terminal,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            Error::Core(e) => e.effect(),
            Error::Integrity(e) => e.effect(),
            Error::Sync(e) => e.effect(),
            Error::Config(_) => Effect::None,
            Error::Io { .. } => Effect::Unknown,
        }
    }
}
