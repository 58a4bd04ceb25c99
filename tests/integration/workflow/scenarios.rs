//! Workflow runs against a scripted in-memory remote.

use std::fs;

use memsync::core::{MemoryStore, parse_store, serialize_store};
use memsync::git::{DEFAULT_BRANCH, SyncState};
use memsync::test_harness::{InMemoryRemote, fixture_entry, fixture_store};
use memsync::{BackupManager, ReportStatus, RetryPolicy, WorkflowOptions};
use serde_json::json;
use tempfile::TempDir;

const FILE: &str = "memory.json";

fn manager(dir: &TempDir, remote: InMemoryRemote) -> BackupManager<InMemoryRemote> {
    let mut options = WorkflowOptions::new("laptop", dir.path(), FILE, dir.path().join("backups"));
    options.fetch_retry = RetryPolicy::immediate(3);
    options.push_retry = RetryPolicy::immediate(3);
    BackupManager::new(remote, options)
}

#[test]
fn push_race_is_won_by_refetching_and_remerging() {
    let remote = InMemoryRemote::with_contents(
        DEFAULT_BRANCH,
        FILE,
        serialize_store(&fixture_store("desktop", "d", 1)).unwrap(),
    );
    // another machine lands a commit between our fetch and our push
    let mut raced = fixture_store("desktop", "d", 1);
    raced.insert(fixture_entry("phone", "p", 50, 60, json!("from the phone")));
    remote.interleave_push(DEFAULT_BRANCH, FILE, serialize_store(&raced).unwrap());

    let dir = TempDir::new().unwrap();
    let local_path = dir.path().join(FILE);
    fs::write(&local_path, serialize_store(&fixture_store("laptop", "l", 2)).unwrap()).unwrap();
    let manager = manager(&dir, remote.clone());

    let report = manager.run_backup(&local_path, DEFAULT_BRANCH);

    assert_eq!(report.status, ReportStatus::Success, "{report:?}");
    assert_eq!(report.attempts.rounds, 2);
    assert!(report.attempts.rounds <= 3);
    assert!(report.trail.contains(&SyncState::Retrying));
    assert_eq!(report.commit, remote.head(DEFAULT_BRANCH));

    let published = parse_store(&remote.contents(DEFAULT_BRANCH, FILE).unwrap()).unwrap();
    assert_eq!(published.len(), 4);
    assert!(published.hosts().contains("phone"));
    assert_eq!(fs::read(&local_path).unwrap(), remote.contents(DEFAULT_BRANCH, FILE).unwrap());

    // our commit sits on top of the racing one
    let history = remote.history(DEFAULT_BRANCH);
    assert_eq!(history.len(), 3);
    assert_eq!(
        remote.message_of(&history[1]).as_deref(),
        Some("concurrent writer")
    );
}

#[test]
fn remote_that_never_settles_diverges_and_keeps_a_draft() {
    let remote = InMemoryRemote::new();
    for i in 0..3 {
        let store = fixture_store("desktop", &format!("race{i}"), 1);
        remote.interleave_push(DEFAULT_BRANCH, FILE, serialize_store(&store).unwrap());
    }
    let dir = TempDir::new().unwrap();
    let local_path = dir.path().join(FILE);
    let original = serialize_store(&fixture_store("laptop", "l", 1)).unwrap();
    fs::write(&local_path, &original).unwrap();

    let report = manager(&dir, remote).run_backup(&local_path, DEFAULT_BRANCH);

    assert_eq!(report.status, ReportStatus::Failed);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.error.as_ref().unwrap().kind, "remote_diverged");
    assert_eq!(report.attempts.rounds, 3);
    let draft = report.draft_path.as_ref().unwrap();
    assert!(parse_store(&fs::read(draft).unwrap()).is_ok());
    assert_eq!(fs::read(&local_path).unwrap(), original);
}

#[test]
fn invalid_remote_entry_is_quarantined_and_the_rest_published() {
    let good = fixture_entry("desktop", "ok", 10, 10, json!({"fact": "kept"}));
    let mut broken = fixture_entry("desktop", "bad", 10, 10, json!({"fact": "tampered"}));
    broken.content = json!({"fact": "tampered after checksum"});
    let remote = InMemoryRemote::with_contents(
        DEFAULT_BRANCH,
        FILE,
        serialize_store(&MemoryStore::from_entries([good.clone(), broken.clone()])).unwrap(),
    );
    let dir = TempDir::new().unwrap();
    let local_path = dir.path().join(FILE);

    let report = manager(&dir, remote.clone()).run_backup(&local_path, DEFAULT_BRANCH);

    assert_eq!(report.status, ReportStatus::Partial, "{report:?}");
    assert_eq!(report.exit_code(), 2);
    assert_eq!(report.counts.rejected, 1);
    let published = parse_store(&remote.contents(DEFAULT_BRANCH, FILE).unwrap()).unwrap();
    assert!(published.contains(&good.id));
    assert!(!published.contains(&broken.id));

    let quarantined: serde_json::Value =
        serde_json::from_slice(&fs::read(report.quarantine_path.unwrap()).unwrap()).unwrap();
    assert_eq!(quarantined["entries"][0]["key"], broken.id.as_str());
}

#[test]
fn report_serializes_for_callers() {
    let dir = TempDir::new().unwrap();
    let local_path = dir.path().join(FILE);
    fs::write(&local_path, serialize_store(&fixture_store("laptop", "l", 1)).unwrap()).unwrap();

    let report = manager(&dir, InMemoryRemote::new()).run_backup(&local_path, DEFAULT_BRANCH);
    let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(value["status"], "success");
    assert_eq!(value["host"], "laptop");
    assert_eq!(value["counts"]["added"], 1);
    assert_eq!(value["trail"][0], "idle");
    assert!(value["commit"].is_string());
}
