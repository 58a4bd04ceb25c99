//! The git capability the sync controller talks to.

use std::fmt;

use serde::Serialize;

use super::error::GitError;

/// Hex object id of a commit.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        self.0.get(..10).unwrap_or(&self.0)
    }
}

impl From<git2::Oid> for CommitId {
    fn from(oid: git2::Oid) -> Self {
        Self(oid.to_string())
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self.short())
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote view of the memory branch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteSnapshot {
    /// Tip of the branch; `None` when the branch does not exist yet.
    pub head: Option<CommitId>,
    /// Memory file at `head`; `None` when absent.
    pub contents: Option<Vec<u8>>,
}

/// Fetch, commit and push for one memory file on one branch.
///
/// Implementations report transient transport failures as
/// `GitError::Network` and lost push races as `GitError::NonFastForward`;
/// the controller owns retries.
pub trait GitRemote {
    /// Read-only: bring the remote branch in and read the file at its tip.
    fn fetch(&self, branch: &str, file: &str) -> Result<RemoteSnapshot, GitError>;

    /// Record `contents` at `file` in a commit whose only parent is
    /// `parent`, and point the local branch at it.
    fn commit(
        &self,
        branch: &str,
        file: &str,
        parent: Option<&CommitId>,
        contents: &[u8],
        message: &str,
    ) -> Result<CommitId, GitError>;

    /// Fast-forward the remote branch to `commit`.
    fn push(&self, branch: &str, commit: &CommitId) -> Result<(), GitError>;
}

impl<R: GitRemote + ?Sized> GitRemote for &R {
    fn fetch(&self, branch: &str, file: &str) -> Result<RemoteSnapshot, GitError> {
        (**self).fetch(branch, file)
    }

    fn commit(
        &self,
        branch: &str,
        file: &str,
        parent: Option<&CommitId>,
        contents: &[u8],
        message: &str,
    ) -> Result<CommitId, GitError> {
        (**self).commit(branch, file, parent, contents, message)
    }

    fn push(&self, branch: &str, commit: &CommitId) -> Result<(), GitError> {
        (**self).push(branch, commit)
    }
}
