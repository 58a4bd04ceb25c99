//! Git capability and sync controller errors.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::lock::SyncLockError;
use super::stash::StashError;
use crate::core::{CoreError, ParseError, Side};
use crate::error::{Disposition, Effect};
use crate::integrity::IntegrityError;

/// Which network-facing git operation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GitOp {
    Fetch,
    Push,
}

impl fmt::Display for GitOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GitOp::Fetch => "fetch",
            GitOp::Push => "push",
        })
    }
}

/// Errors from a `GitRemote` implementation.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GitError {
    #[error("failed to open repository at {path:?}: {source}")]
    OpenRepo {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("network error during {op}: {message}")]
    Network { op: GitOp, message: String },

    #[error("push rejected (non-fast-forward)")]
    NonFastForward,

    #[error(transparent)]
    PushRejected(#[from] PushRejected),

    #[error("invalid memory file path `{0}`")]
    InvalidPath(String),

    #[error("expected a blob at `{0}`")]
    NotABlob(String),

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
}

impl GitError {
    pub fn is_network(&self) -> bool {
        matches!(self, GitError::Network { .. })
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            GitError::Network { .. } | GitError::NonFastForward => Disposition::Retryable,
            _ => Disposition::Terminal,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            GitError::Network { op: GitOp::Fetch, .. }
            | GitError::OpenRepo { .. }
            | GitError::InvalidPath(_) => Effect::None,
            // the local branch already points at our commit
            GitError::NonFastForward | GitError::PushRejected(_) => Effect::Some,
            GitError::Network { op: GitOp::Push, .. }
            | GitError::NotABlob(_)
            | GitError::Git(_) => Effect::Unknown,
        }
    }
}

/// Push was rejected by the remote with a status message.
#[derive(Error, Debug)]
#[error("push rejected: {message}")]
pub struct PushRejected {
    pub message: String,
}

/// Errors from one sync cycle.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SyncError {
    #[error("{op} failed after {attempts} attempts: {source}")]
    RecoverableNetwork {
        op: GitOp,
        attempts: u32,
        #[source]
        source: GitError,
        draft: Option<PathBuf>,
    },

    #[error("remote kept moving; push rejected on all {attempts} attempts")]
    RemoteDiverged {
        attempts: u32,
        draft: Option<PathBuf>,
    },

    #[error("manual intervention required: {reason}")]
    ManualInterventionRequired {
        reason: String,
        draft: Option<PathBuf>,
    },

    #[error("{} store is unreadable: {source}", .side.as_str())]
    Parse {
        side: Side,
        #[source]
        source: ParseError,
    },

    #[error("failed to read {path:?}: {source}")]
    ReadLocal {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Lock(#[from] SyncLockError),

    #[error(transparent)]
    Stash(#[from] StashError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Git(#[from] GitError),
}

impl SyncError {
    pub fn disposition(&self) -> Disposition {
        match self {
            SyncError::RecoverableNetwork { .. } | SyncError::RemoteDiverged { .. } => {
                Disposition::Retryable
            }
            SyncError::Lock(SyncLockError::Held { .. }) => Disposition::Retryable,
            SyncError::Git(e) => e.disposition(),
            _ => Disposition::Terminal,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            SyncError::Parse { .. }
            | SyncError::ReadLocal { .. }
            | SyncError::Lock(_)
            | SyncError::Core(_) => Effect::None,
            SyncError::Integrity(e) => e.effect(),
            SyncError::Git(e) => e.effect(),
            SyncError::RecoverableNetwork { source, .. } => source.effect(),
            SyncError::RemoteDiverged { .. } => Effect::Some,
            SyncError::ManualInterventionRequired { .. } | SyncError::Stash(_) => Effect::Unknown,
        }
    }

    /// Stable snake_case name for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::RecoverableNetwork { .. } => "recoverable_network",
            SyncError::RemoteDiverged { .. } => "remote_diverged",
            SyncError::ManualInterventionRequired { .. } => "manual_intervention_required",
            SyncError::Parse { .. } => "parse",
            SyncError::ReadLocal { .. } => "io",
            SyncError::Lock(SyncLockError::Held { .. }) => "lock_held",
            SyncError::Lock(_) => "lock",
            SyncError::Stash(_) => "working_copy",
            SyncError::Integrity(_) => "backup",
            SyncError::Core(_) => "encode",
            SyncError::Git(_) => "git",
        }
    }

    /// Path of the preserved merge draft, if one was written.
    pub fn draft(&self) -> Option<&PathBuf> {
        match self {
            SyncError::RecoverableNetwork { draft, .. }
            | SyncError::RemoteDiverged { draft, .. }
            | SyncError::ManualInterventionRequired { draft, .. } => draft.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn set_draft(&mut self, path: PathBuf) {
        match self {
            SyncError::RecoverableNetwork { draft, .. }
            | SyncError::RemoteDiverged { draft, .. }
            | SyncError::ManualInterventionRequired { draft, .. } => *draft = Some(path),
            _ => {}
        }
    }
}
