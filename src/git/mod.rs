//! Git integration.
//!
//! Provides:
//! - `GitRemote`, the fetch/commit/push capability, and its `git2` implementation
//! - Sync typestate machine (Idle → Fetched → Merged → Committed) and controller
//! - Per-repository sync lock and the working-copy guard

pub mod backoff;
pub mod error;
pub mod lock;
pub mod remote;
pub mod repo;
pub mod stash;
pub mod sync;

pub use backoff::{Backoff, RetryPolicy, retry_network};
pub use error::{GitError, GitOp, PushRejected, SyncError};
pub use lock::{LOCK_FILE_NAME, SyncLock, SyncLockError, SyncLockMeta, read_lock_meta};
pub use remote::{CommitId, GitRemote, RemoteSnapshot};
pub use repo::Git2Remote;
pub use stash::{StashError, WorkingCopyGuard};
pub use sync::{
    DEFAULT_BRANCH, DEFAULT_PUSH_ATTEMPTS, SyncAttempts, SyncController, SyncOptions, SyncOutcome,
    SyncProcess, SyncState, commit_message,
};
