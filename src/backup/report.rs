//! What a backup run tells its caller.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Disposition, Effect};
use crate::git::{CommitId, GitError, SyncAttempts, SyncError, SyncLockError, SyncState};
use crate::merge::{ConflictRecord, MergeOperation, MergeStats};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Success,
    /// Published, but some entries were quarantined.
    Partial,
    Failed,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Success => "success",
            ReportStatus::Partial => "partial",
            ReportStatus::Failed => "failed",
        }
    }

    /// Process exit code for this status.
    pub fn exit_code(self) -> i32 {
        match self {
            ReportStatus::Success => 0,
            ReportStatus::Partial => 2,
            ReportStatus::Failed => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportError {
    pub kind: String,
    pub message: String,
    pub disposition: Disposition,
    pub effect: Effect,
}

#[derive(Clone, Debug, Serialize)]
pub struct BackupReport {
    pub status: ReportStatus,
    pub host: String,
    pub branch: String,
    pub local_path: PathBuf,
    pub counts: MergeStats,
    pub conflicts: Vec<ConflictRecord>,
    pub error: Option<ReportError>,
    pub guidance: Option<String>,
    pub backup_path: Option<PathBuf>,
    pub quarantine_path: Option<PathBuf>,
    pub draft_path: Option<PathBuf>,
    pub commit: Option<CommitId>,
    pub attempts: SyncAttempts,
    pub hosts: Vec<String>,
    pub trail: Vec<SyncState>,
    pub duration_ms: u64,
}

impl BackupReport {
    pub(crate) fn new(host: &str, branch: &str, local_path: &Path) -> Self {
        Self {
            status: ReportStatus::Success,
            host: host.to_string(),
            branch: branch.to_string(),
            local_path: local_path.to_path_buf(),
            counts: MergeStats::default(),
            conflicts: Vec::new(),
            error: None,
            guidance: None,
            backup_path: None,
            quarantine_path: None,
            draft_path: None,
            commit: None,
            attempts: SyncAttempts::default(),
            hosts: Vec::new(),
            trail: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Report for a run that failed before the workflow could start.
    pub fn not_started(host: &str, branch: &str, local_path: &Path, err: &SyncError) -> Self {
        let mut report = Self::new(host, branch, local_path);
        report.trail = vec![SyncState::Failed];
        report.fail(err);
        report
    }

    pub fn is_success(&self) -> bool {
        self.status == ReportStatus::Success
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    /// Counts, conflicts and hosts of a merge, published or not.
    pub(crate) fn record_merge(&mut self, op: &MergeOperation) {
        self.counts = op.stats();
        self.conflicts = op.conflicts_detected.clone();
        self.hosts = op.hosts().into_iter().collect();
    }

    pub(crate) fn fail(&mut self, err: &SyncError) {
        self.status = ReportStatus::Failed;
        self.draft_path = err.draft().cloned();
        self.guidance = Some(guidance(err, self.backup_path.as_deref()));
        self.error = Some(ReportError {
            kind: err.kind().to_string(),
            message: err.to_string(),
            disposition: err.disposition(),
            effect: err.effect(),
        });
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn guidance(err: &SyncError, backup: Option<&Path>) -> String {
    let backup_hint = match backup {
        Some(path) => format!(" A copy of the local file is at {}.", path.display()),
        None => String::new(),
    };
    match err {
        SyncError::RecoverableNetwork { op, .. } => format!(
            "The remote could not be reached during {op}. Nothing was published; \
             run the backup again once the network is back."
        ),
        SyncError::RemoteDiverged { draft, .. } => format!(
            "Other machines kept pushing while this one merged. Run the backup again; \
             the last merged draft is {}.",
            describe_path(draft.as_deref())
        ),
        SyncError::ManualInterventionRequired { draft, .. } => format!(
            "The merge produced a result that cannot be published. Inspect the draft at {} \
             before retrying.{backup_hint}",
            describe_path(draft.as_deref())
        ),
        SyncError::Parse { side, .. } => format!(
            "The {} memory file is not a valid store and was left untouched. \
             Fix or restore it, then run the backup again.{backup_hint}",
            side.as_str()
        ),
        SyncError::Lock(SyncLockError::Held { path, .. }) => format!(
            "Another sync is running in this repository. Wait for it to finish, or \
             remove {} if no such process exists.",
            path.display()
        ),
        SyncError::Git(GitError::OpenRepo { path, .. }) => format!(
            "No git repository was found at {}. Run the backup inside a clone of the \
             shared repository, or pass --repo.",
            path.display()
        ),
        SyncError::Stash(_) => format!(
            "The local memory file changed while syncing. Review it and run the backup \
             again.{backup_hint}"
        ),
        _ => format!("The backup did not complete; check the error and retry.{backup_hint}"),
    }
}

fn describe_path(path: Option<&Path>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => "not available".to_string(),
    }
}
