//! Sync typestate machine and its retry controller.
//!
//! One round is Idle → Fetched → Merged → Committed → pushed, each
//! transition consuming the previous phase. The controller drives rounds:
//! - Linear history: the commit's only parent is the fetched remote head
//! - Network failures are retried with bounded backoff inside a round
//! - A rejected push starts a new round (re-fetch, re-merge), up to a limit
//! - Any failure after a merge leaves the merged draft on disk

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::backoff::{RetryPolicy, retry_network};
use super::error::{GitError, GitOp, SyncError};
use super::remote::{CommitId, GitRemote, RemoteSnapshot};
use super::stash::WorkingCopyGuard;
use crate::core::{MemoryStore, Side, parse_store, serialize_store};
use crate::integrity::{preserve_draft, validate_entry};
use crate::merge::{MergeEngine, MergeOperation};

pub const DEFAULT_BRANCH: &str = "memory/store";
pub const DEFAULT_PUSH_ATTEMPTS: u32 = 3;

/// Where a sync cycle is, recorded as a trail for reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Fetching,
    Merging,
    Committing,
    Pushing,
    Retrying,
    Failed,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Fetching => "fetching",
            SyncState::Merging => "merging",
            SyncState::Committing => "committing",
            SyncState::Pushing => "pushing",
            SyncState::Retrying => "retrying",
            SyncState::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct SyncOptions {
    pub branch: String,
    /// Repository-relative path of the memory file.
    pub file: String,
    pub engine: MergeEngine,
    pub fetch_retry: RetryPolicy,
    pub push_retry: RetryPolicy,
    /// Rounds allowed when the push is rejected, including the first.
    pub max_push_attempts: u32,
    /// Where merged drafts go when a cycle fails after merging.
    pub draft_dir: PathBuf,
}

impl SyncOptions {
    pub fn new(file: impl Into<String>, draft_dir: impl Into<PathBuf>) -> Self {
        Self {
            branch: DEFAULT_BRANCH.to_string(),
            file: file.into(),
            engine: MergeEngine::default(),
            fetch_retry: RetryPolicy::default(),
            push_retry: RetryPolicy::default(),
            max_push_attempts: DEFAULT_PUSH_ATTEMPTS,
            draft_dir: draft_dir.into(),
        }
    }
}

/// Attempt counters across all rounds of one cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncAttempts {
    pub fetch: u32,
    pub push: u32,
    pub rounds: u32,
}

#[derive(Debug)]
pub struct SyncOutcome {
    /// Commit now at the remote head; `None` when nothing needed pushing.
    pub commit: Option<CommitId>,
    pub operation: MergeOperation,
    /// Serialized merged store, as committed and staged locally.
    pub bytes: Vec<u8>,
}

impl SyncOutcome {
    pub fn pushed(&self) -> bool {
        self.commit.is_some()
    }
}

// =============================================================================
// Phases
// =============================================================================

pub struct Idle;

pub struct Fetched {
    pub snapshot: RemoteSnapshot,
    pub remote_store: MemoryStore,
}

pub struct Merged {
    pub parent: Option<CommitId>,
    pub operation: MergeOperation,
    pub bytes: Vec<u8>,
    /// The remote file already holds exactly `bytes`.
    pub up_to_date: bool,
}

pub struct Committed {
    pub commit: Option<CommitId>,
    pub operation: MergeOperation,
    pub bytes: Vec<u8>,
}

/// One round of the sync protocol.
///
/// ```ignore
/// SyncProcess::new()
///     .fetch(&mut controller)?
///     .merge(&mut controller, &local)?
///     .commit(&mut controller)?
///     .push(&mut controller)?;
/// ```
pub struct SyncProcess<Phase> {
    pub phase: Phase,
}

impl Default for SyncProcess<Idle> {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncProcess<Idle> {
    pub fn new() -> Self {
        SyncProcess { phase: Idle }
    }

    /// Fetch the remote branch and parse its memory file.
    ///
    /// A missing branch or file is an empty remote store.
    pub fn fetch<R: GitRemote>(
        self,
        ctl: &mut SyncController<R>,
    ) -> Result<SyncProcess<Fetched>, SyncError> {
        ctl.enter(SyncState::Fetching);
        let SyncController {
            remote,
            options,
            trail,
            ..
        } = &mut *ctl;
        let (result, attempts) = retry_network(
            &options.fetch_retry,
            |_| remote.fetch(&options.branch, &options.file),
            |attempt, err, delay| {
                trail.push(SyncState::Retrying);
                tracing::warn!(attempt, error = %err, ?delay, "fetch failed, retrying");
            },
        );
        ctl.attempts.fetch += attempts;

        let snapshot = result.map_err(|source| network_or_git(GitOp::Fetch, attempts, source))?;
        let remote_store = match &snapshot.contents {
            Some(bytes) => parse_store(bytes).map_err(|source| SyncError::Parse {
                side: Side::Remote,
                source,
            })?,
            None => MemoryStore::new(),
        };
        tracing::debug!(
            head = ?snapshot.head,
            entries = remote_store.len(),
            "remote store loaded"
        );
        Ok(SyncProcess {
            phase: Fetched {
                snapshot,
                remote_store,
            },
        })
    }
}

impl SyncProcess<Fetched> {
    /// Merge the local store with the fetched one and check the result.
    pub fn merge<R: GitRemote>(
        self,
        ctl: &mut SyncController<R>,
        local: &MemoryStore,
    ) -> Result<SyncProcess<Merged>, SyncError> {
        ctl.enter(SyncState::Merging);
        let Fetched {
            snapshot,
            remote_store,
        } = self.phase;

        let operation = ctl.options.engine.merge(local, &remote_store);
        let bytes = serialize_store(&operation.merged)?;
        ctl.draft = Some(bytes.clone());
        ctl.last_merge = Some(operation.clone());

        let invalid: Vec<String> = operation
            .merged
            .iter()
            .filter(|entry| !validate_entry(entry).valid)
            .map(|entry| entry.id.to_string())
            .collect();
        if !invalid.is_empty() {
            return Err(SyncError::ManualInterventionRequired {
                reason: format!(
                    "{} merged entries failed validation: {}",
                    invalid.len(),
                    summarize_ids(&invalid)
                ),
                draft: None,
            });
        }

        let up_to_date = snapshot.contents.as_deref() == Some(bytes.as_slice());
        Ok(SyncProcess {
            phase: Merged {
                parent: snapshot.head,
                operation,
                bytes,
                up_to_date,
            },
        })
    }
}

impl SyncProcess<Merged> {
    /// Commit the merged file on top of the fetched head.
    ///
    /// Skipped when the remote already holds the merged bytes.
    pub fn commit<R: GitRemote>(
        self,
        ctl: &mut SyncController<R>,
    ) -> Result<SyncProcess<Committed>, SyncError> {
        let Merged {
            parent,
            operation,
            bytes,
            up_to_date,
        } = self.phase;

        if up_to_date {
            tracing::info!("remote already up to date, nothing to commit");
            return Ok(SyncProcess {
                phase: Committed {
                    commit: None,
                    operation,
                    bytes,
                },
            });
        }

        ctl.enter(SyncState::Committing);
        let message = commit_message(&ctl.options.branch, &operation);
        let commit = ctl.remote.commit(
            &ctl.options.branch,
            &ctl.options.file,
            parent.as_ref(),
            &bytes,
            &message,
        )?;
        tracing::debug!(commit = %commit.short(), "merge committed");
        Ok(SyncProcess {
            phase: Committed {
                commit: Some(commit),
                operation,
                bytes,
            },
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.phase.bytes
    }
}

impl SyncProcess<Committed> {
    /// Push the commit, retrying network failures.
    ///
    /// Returns `GitError::NonFastForward` (wrapped) if the remote moved;
    /// the controller starts another round.
    pub fn push<R: GitRemote>(self, ctl: &mut SyncController<R>) -> Result<SyncOutcome, SyncError> {
        let Committed {
            commit,
            operation,
            bytes,
        } = self.phase;
        let Some(commit) = commit else {
            return Ok(SyncOutcome {
                commit: None,
                operation,
                bytes,
            });
        };

        ctl.enter(SyncState::Pushing);
        let SyncController {
            remote,
            options,
            trail,
            ..
        } = &mut *ctl;
        let (result, attempts) = retry_network(
            &options.push_retry,
            |_| remote.push(&options.branch, &commit),
            |attempt, err, delay| {
                trail.push(SyncState::Retrying);
                tracing::warn!(attempt, error = %err, ?delay, "push failed, retrying");
            },
        );
        ctl.attempts.push += attempts;
        result.map_err(|source| network_or_git(GitOp::Push, attempts, source))?;

        Ok(SyncOutcome {
            commit: Some(commit),
            operation,
            bytes,
        })
    }

    pub fn commit_id(&self) -> Option<&CommitId> {
        self.phase.commit.as_ref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.phase.bytes
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Drives sync rounds against one `GitRemote` and records what happened.
pub struct SyncController<R> {
    remote: R,
    options: SyncOptions,
    trail: Vec<SyncState>,
    attempts: SyncAttempts,
    draft: Option<Vec<u8>>,
    last_merge: Option<MergeOperation>,
}

impl<R: GitRemote> SyncController<R> {
    pub fn new(remote: R, options: SyncOptions) -> Self {
        Self {
            remote,
            options,
            trail: vec![SyncState::Idle],
            attempts: SyncAttempts::default(),
            draft: None,
            last_merge: None,
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn trail(&self) -> &[SyncState] {
        &self.trail
    }

    pub fn attempts(&self) -> SyncAttempts {
        self.attempts
    }

    /// The most recent merge, kept when a later step fails.
    pub fn last_merge(&self) -> Option<&MergeOperation> {
        self.last_merge.as_ref()
    }

    fn enter(&mut self, state: SyncState) {
        tracing::trace!(state = %state, "sync state");
        self.trail.push(state);
    }

    /// Run one full cycle: merge `local` with the remote, publish it, and
    /// stage the result into the guarded working copy.
    ///
    /// The guard is staged only after a commit exists; releasing it is the
    /// caller's decision.
    pub fn run(
        &mut self,
        local: &MemoryStore,
        guard: &mut WorkingCopyGuard,
    ) -> Result<SyncOutcome, SyncError> {
        let span = tracing::info_span!("sync", branch = %self.options.branch);
        let _enter = span.enter();

        match self.run_rounds(local, guard) {
            Ok(outcome) => {
                self.enter(SyncState::Idle);
                tracing::info!(
                    commit = ?outcome.commit,
                    rounds = self.attempts.rounds,
                    "sync complete"
                );
                Ok(outcome)
            }
            Err(mut err) => {
                self.enter(SyncState::Failed);
                self.keep_draft(&mut err);
                tracing::error!(kind = err.kind(), error = %err, "sync failed");
                Err(err)
            }
        }
    }

    fn run_rounds(
        &mut self,
        local: &MemoryStore,
        guard: &mut WorkingCopyGuard,
    ) -> Result<SyncOutcome, SyncError> {
        let max_rounds = self.options.max_push_attempts.max(1);
        loop {
            self.attempts.rounds += 1;
            let round = self.attempts.rounds;

            let committed = SyncProcess::new()
                .fetch(self)?
                .merge(self, local)?
                .commit(self)?;
            guard.stage(committed.bytes())?;

            match committed.push(self) {
                Ok(outcome) => return Ok(outcome),
                Err(SyncError::Git(GitError::NonFastForward)) if round < max_rounds => {
                    self.enter(SyncState::Retrying);
                    tracing::info!(round, "push rejected, remote moved; re-fetching");
                }
                Err(SyncError::Git(GitError::NonFastForward)) => {
                    return Err(SyncError::RemoteDiverged {
                        attempts: round,
                        draft: None,
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn keep_draft(&mut self, err: &mut SyncError) {
        let wants_draft = matches!(
            err,
            SyncError::RecoverableNetwork { .. }
                | SyncError::RemoteDiverged { .. }
                | SyncError::ManualInterventionRequired { .. }
        );
        if !wants_draft {
            return;
        }
        let Some(bytes) = self.draft.take() else {
            return;
        };
        match preserve_draft(&bytes, &self.options.draft_dir) {
            Ok(path) => {
                tracing::warn!(path = %path.display(), "merged draft preserved");
                err.set_draft(path);
            }
            Err(e) => tracing::error!(error = %e, "failed to preserve merged draft"),
        }
    }
}

fn network_or_git(op: GitOp, attempts: u32, source: GitError) -> SyncError {
    if source.is_network() {
        SyncError::RecoverableNetwork {
            op,
            attempts,
            source,
            draft: None,
        }
    } else {
        SyncError::Git(source)
    }
}

const MAX_LISTED_CONFLICTS: usize = 5;

fn summarize_ids(ids: &[String]) -> String {
    let shown: Vec<&str> = ids
        .iter()
        .take(MAX_LISTED_CONFLICTS)
        .map(String::as_str)
        .collect();
    let mut out = shown.join(", ");
    if ids.len() > MAX_LISTED_CONFLICTS {
        out.push_str(&format!(" ... and {} more", ids.len() - MAX_LISTED_CONFLICTS));
    }
    out
}

/// Commit message for a merge.
///
/// Subject: `memsync(<branch>): +A added, ~R resolved, !Q rejected, N conflicts`.
/// Body: participating hosts and up to five conflicted ids.
pub fn commit_message(branch: &str, op: &MergeOperation) -> String {
    let stats = op.stats();
    let mut msg = format!(
        "memsync({branch}): +{} added, ~{} resolved, !{} rejected, {} conflicts",
        stats.added, stats.resolved, stats.rejected, stats.conflicts
    );

    let hosts: Vec<String> = op.hosts().into_iter().collect();
    if !hosts.is_empty() {
        msg.push_str("\n\nhosts: ");
        msg.push_str(&hosts.join(", "));
    }

    if !op.conflicts_detected.is_empty() {
        msg.push_str("\nconflicts:");
        for conflict in op.conflicts_detected.iter().take(MAX_LISTED_CONFLICTS) {
            msg.push_str("\n  ");
            msg.push_str(conflict.id.as_str());
        }
        let extra = op.conflicts_detected.len().saturating_sub(MAX_LISTED_CONFLICTS);
        if extra > 0 {
            msg.push_str(&format!("\n  ... and {extra} more"));
        }
    }
    msg
}
