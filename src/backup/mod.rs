//! End-to-end backup workflow.
//!
//! lock → pre-merge backup → fetch → parse → validate + dedupe → merge →
//! validate merged → commit and push → report. Every run produces a
//! `BackupReport`; failures before the push leave the local file as it was.

mod report;

use std::path::{Path, PathBuf};
use std::time::Instant;

pub use report::{BackupReport, ReportError, ReportStatus};

use crate::core::{MemoryStore, Side, parse_store};
use crate::error::{Disposition, Effect};
use crate::git::{
    DEFAULT_PUSH_ATTEMPTS, Git2Remote, GitRemote, RetryPolicy, StashError, SyncController,
    SyncError, SyncLock, SyncOptions, WorkingCopyGuard,
};
use crate::integrity::{pre_merge_backup, quarantine_rejected};
use crate::merge::MergeEngine;

#[derive(Clone, Debug)]
pub struct WorkflowOptions {
    /// `source_host` of this machine; recorded in the lock.
    pub host: String,
    /// Where the sync lock lives.
    pub repo_root: PathBuf,
    /// Repository-relative path of the memory file in commits.
    pub file: String,
    /// Backups, quarantine files and merge drafts.
    pub backup_dir: PathBuf,
    pub engine: MergeEngine,
    pub fetch_retry: RetryPolicy,
    pub push_retry: RetryPolicy,
    pub max_push_attempts: u32,
}

impl WorkflowOptions {
    pub fn new(
        host: impl Into<String>,
        repo_root: impl Into<PathBuf>,
        file: impl Into<String>,
        backup_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            repo_root: repo_root.into(),
            file: file.into(),
            backup_dir: backup_dir.into(),
            engine: MergeEngine::default(),
            fetch_retry: RetryPolicy::default(),
            push_retry: RetryPolicy::default(),
            max_push_attempts: DEFAULT_PUSH_ATTEMPTS,
        }
    }

    fn sync_options(&self, branch: &str) -> SyncOptions {
        let mut options = SyncOptions::new(self.file.clone(), self.backup_dir.clone());
        options.branch = branch.to_string();
        options.engine = self.engine;
        options.fetch_retry = self.fetch_retry;
        options.push_retry = self.push_retry;
        options.max_push_attempts = self.max_push_attempts;
        options
    }
}

pub struct BackupManager<R> {
    remote: R,
    options: WorkflowOptions,
}

impl BackupManager<Git2Remote> {
    /// Manager over the repository at `options.repo_root`.
    pub fn open(options: WorkflowOptions, remote_name: &str) -> Result<Self, SyncError> {
        let remote = Git2Remote::open(&options.repo_root, remote_name)?;
        Ok(Self::new(remote, options))
    }
}

impl<R: GitRemote> BackupManager<R> {
    pub fn new(remote: R, options: WorkflowOptions) -> Self {
        Self { remote, options }
    }

    pub fn options(&self) -> &WorkflowOptions {
        &self.options
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Back up `local_path`, merge it with `remote_ref`, and publish.
    pub fn run_backup(&self, local_path: &Path, remote_ref: &str) -> BackupReport {
        let started = Instant::now();
        let span = tracing::info_span!(
            "backup",
            host = %self.options.host,
            branch = remote_ref,
        );
        let _enter = span.enter();

        let mut report = BackupReport::new(&self.options.host, remote_ref, local_path);
        let mut controller =
            SyncController::new(&self.remote, self.options.sync_options(remote_ref));
        if let Err(err) = self.run_inner(local_path, &mut controller, &mut report) {
            if let Some(op) = controller.last_merge() {
                report.record_merge(op);
                if op.has_rejections() {
                    match quarantine_rejected(&op.rejected_entries, &self.options.backup_dir) {
                        Ok(path) => report.quarantine_path = path,
                        Err(e) => tracing::error!(error = %e, "failed to write quarantine file"),
                    }
                }
            }
            report.fail(&err);
        }
        report.attempts = controller.attempts();
        report.trail = controller.trail().to_vec();
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::info!(
            status = report.status.as_str(),
            added = report.counts.added,
            resolved = report.counts.resolved,
            rejected = report.counts.rejected,
            conflicts = report.counts.conflicts,
            duration_ms = report.duration_ms,
            "backup finished"
        );
        report
    }

    fn run_inner(
        &self,
        local_path: &Path,
        controller: &mut SyncController<&R>,
        report: &mut BackupReport,
    ) -> Result<(), SyncError> {
        let lock = SyncLock::acquire(&self.options.repo_root, &self.options.host)?;

        let mut guard = WorkingCopyGuard::capture(local_path).map_err(|e| match e {
            StashError::Read { path, source } => SyncError::ReadLocal { path, source },
            other => other.into(),
        })?;
        let local = match guard.original() {
            Some(bytes) => {
                let handle = pre_merge_backup(bytes, &self.options.backup_dir)?;
                tracing::info!(path = %handle.path.display(), size = handle.size, "local store backed up");
                report.backup_path = Some(handle.path);
                parse_store(bytes).map_err(|source| SyncError::Parse {
                    side: Side::Local,
                    source,
                })?
            }
            None => {
                tracing::info!("no local memory file, starting from an empty store");
                MemoryStore::new()
            }
        };

        let outcome = controller.run(&local, &mut guard)?;
        guard.release();

        let op = &outcome.operation;
        report.record_merge(op);
        report.commit = outcome.commit.clone();

        if op.has_rejections() {
            report.status = ReportStatus::Partial;
            match quarantine_rejected(&op.rejected_entries, &self.options.backup_dir) {
                Ok(path) => report.quarantine_path = path,
                Err(e) => {
                    tracing::error!(error = %e, "failed to write quarantine file");
                    report.error = Some(ReportError {
                        kind: "quarantine".to_string(),
                        message: e.to_string(),
                        disposition: Disposition::Terminal,
                        effect: Effect::Some,
                    });
                    report.guidance = Some(
                        "The merge was published but rejected entries could not be saved; \
                         they remain in the local backup and the remote history."
                            .to_string(),
                    );
                }
            }
        }

        if let Err(e) = lock.release() {
            tracing::warn!(error = %e, "failed to remove sync lock");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::{Value, json};

    use super::*;
    use crate::core::serialize_store;
    use crate::git::{DEFAULT_BRANCH, SyncState, lock::lock_path};
    use crate::test_harness::{InMemoryRemote, fixture_entry, fixture_store};

    const FILE: &str = "memory.json";

    fn setup(remote: InMemoryRemote) -> (tempfile::TempDir, BackupManager<InMemoryRemote>) {
        let dir = tempfile::tempdir().unwrap();
        let mut options = WorkflowOptions::new("laptop", dir.path(), FILE, dir.path().join("backups"));
        options.fetch_retry = RetryPolicy::immediate(5);
        options.push_retry = RetryPolicy::immediate(5);
        (dir, BackupManager::new(remote, options))
    }

    #[test]
    fn publishes_and_keeps_merged_file() {
        let theirs = fixture_store("desktop", "d", 2);
        let remote =
            InMemoryRemote::with_contents(DEFAULT_BRANCH, FILE, serialize_store(&theirs).unwrap());
        let (dir, manager) = setup(remote.clone());
        let local_path = dir.path().join(FILE);
        fs::write(&local_path, serialize_store(&fixture_store("laptop", "l", 3)).unwrap()).unwrap();

        let report = manager.run_backup(&local_path, DEFAULT_BRANCH);

        assert_eq!(report.status, ReportStatus::Success, "{report:?}");
        assert_eq!(report.counts.added, 5);
        assert_eq!(report.counts.total, 5);
        assert_eq!(report.hosts, vec!["desktop".to_string(), "laptop".to_string()]);
        assert_eq!(report.commit, remote.head(DEFAULT_BRANCH));
        assert!(report.backup_path.as_ref().unwrap().exists());
        assert_eq!(report.trail.last(), Some(&SyncState::Idle));
        assert_eq!(
            fs::read(&local_path).unwrap(),
            remote.contents(DEFAULT_BRANCH, FILE).unwrap()
        );
        assert!(!lock_path(dir.path()).exists());
    }

    #[test]
    fn invalid_remote_entry_is_quarantined() {
        let bad = MemoryStore::from_entries([fixture_entry("desktop", "bad", 10, 10, json!("x"))]);
        let mut theirs: Value = serde_json::from_slice(&serialize_store(&bad).unwrap()).unwrap();
        for entry in theirs["entries"].as_object_mut().unwrap().values_mut() {
            entry["checksum"] = json!(format!("sha256:{}", "0".repeat(64)));
        }
        let remote = InMemoryRemote::with_contents(
            DEFAULT_BRANCH,
            FILE,
            serde_json::to_vec(&theirs).unwrap(),
        );
        let (dir, manager) = setup(remote);
        let local_path = dir.path().join(FILE);
        fs::write(&local_path, serialize_store(&fixture_store("laptop", "l", 1)).unwrap()).unwrap();

        let report = manager.run_backup(&local_path, DEFAULT_BRANCH);

        assert_eq!(report.status, ReportStatus::Partial);
        assert_eq!(report.counts.rejected, 1);
        assert_eq!(report.counts.total, 1);
        let quarantine = report.quarantine_path.unwrap();
        let saved: Value = serde_json::from_slice(&fs::read(quarantine).unwrap()).unwrap();
        assert_eq!(saved["entries"][0]["side"], "remote");
    }

    #[test]
    fn unreadable_local_file_is_left_untouched() {
        let (dir, manager) = setup(InMemoryRemote::new());
        let local_path = dir.path().join(FILE);
        fs::write(&local_path, b"{\"entries\": {}}").unwrap();

        let report = manager.run_backup(&local_path, DEFAULT_BRANCH);

        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.error.as_ref().unwrap().kind, "parse");
        assert!(report.backup_path.is_some());
        assert_eq!(fs::read(&local_path).unwrap(), b"{\"entries\": {}}");
        assert_eq!(manager.remote().push_count(), 0);
    }

    #[test]
    fn missing_local_file_pulls_the_remote() {
        let theirs = fixture_store("desktop", "d", 2);
        let bytes = serialize_store(&theirs).unwrap();
        let remote = InMemoryRemote::with_contents(DEFAULT_BRANCH, FILE, bytes.clone());
        let (dir, manager) = setup(remote);
        let local_path = dir.path().join(FILE);

        let report = manager.run_backup(&local_path, DEFAULT_BRANCH);

        assert_eq!(report.status, ReportStatus::Success);
        assert!(report.backup_path.is_none());
        assert!(report.commit.is_none());
        assert_eq!(fs::read(&local_path).unwrap(), bytes);
    }

    #[test]
    fn held_lock_fails_fast() {
        let (dir, manager) = setup(InMemoryRemote::new());
        let _held = SyncLock::acquire(dir.path(), "other").unwrap();

        let report = manager.run_backup(&dir.path().join(FILE), DEFAULT_BRANCH);

        assert_eq!(report.status, ReportStatus::Failed);
        let error = report.error.unwrap();
        assert_eq!(error.kind, "lock_held");
        assert_eq!(error.disposition, Disposition::Retryable);
        assert_eq!(manager.remote().fetch_count(), 0);
    }

    #[test]
    fn outage_restores_local_file_and_reports_guidance() {
        let remote = InMemoryRemote::new();
        remote.fail_next_pushes(10);
        let (dir, manager) = setup(remote);
        let local_path = dir.path().join(FILE);
        let original = serialize_store(&fixture_store("laptop", "l", 2)).unwrap();
        fs::write(&local_path, &original).unwrap();

        let report = manager.run_backup(&local_path, DEFAULT_BRANCH);

        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.error.as_ref().unwrap().kind, "recoverable_network");
        assert!(report.draft_path.as_ref().unwrap().exists());
        assert_eq!(report.attempts.push, 5);
        assert!(report.guidance.unwrap().contains("push"));
        assert_eq!(fs::read(&local_path).unwrap(), original);

        // what the unpublished merge would have done is still reported
        assert_eq!(report.counts.added, 2);
        assert_eq!(report.counts.total, 2);
        assert_eq!(report.hosts, vec!["laptop".to_string()]);
    }

    #[test]
    fn failed_run_still_quarantines_rejected_entries() {
        let mut bad = fixture_entry("desktop", "bad", 10, 10, json!("original"));
        bad.content = json!("tampered");
        let remote = InMemoryRemote::with_contents(
            DEFAULT_BRANCH,
            FILE,
            serialize_store(&MemoryStore::from_entries([bad.clone()])).unwrap(),
        );
        remote.fail_next_pushes(10);
        let (dir, manager) = setup(remote);
        let local_path = dir.path().join(FILE);
        fs::write(&local_path, serialize_store(&fixture_store("laptop", "l", 3)).unwrap()).unwrap();

        let report = manager.run_backup(&local_path, DEFAULT_BRANCH);

        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.counts.added, 3);
        assert_eq!(report.counts.rejected, 1);
        let quarantine = report.quarantine_path.unwrap();
        let saved: Value = serde_json::from_slice(&fs::read(quarantine).unwrap()).unwrap();
        assert_eq!(saved["entries"][0]["key"], bad.id.as_str());
    }
}
