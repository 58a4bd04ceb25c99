//! Backups between machines sharing a real (bare, on-disk) origin.

use memsync::ReportStatus;
use memsync::core::{MemoryStore, parse_store};
use memsync::git::{DEFAULT_BRANCH, SyncState, read_lock_meta};
use memsync::test_harness::{fixture_entry, fixture_store};
use serde_json::json;

use crate::fixtures::git::{commit_count, head_message, read_branch_file, repo_has_branch};
use crate::fixtures::machine::{FILE, Origin};

#[test]
fn first_backup_creates_the_shared_branch() {
    let origin = Origin::new();
    let laptop = origin.machine("laptop");
    laptop.write_store(&fixture_store("laptop", "l", 3));

    let report = laptop.backup();

    assert_eq!(report.status, ReportStatus::Success, "{report:?}");
    assert_eq!(report.counts.added, 3);
    assert!(report.commit.is_some());
    assert!(repo_has_branch(&origin.path(), DEFAULT_BRANCH).unwrap());
    assert_eq!(
        read_branch_file(&origin.path(), DEFAULT_BRANCH, FILE).unwrap(),
        Some(laptop.local_bytes())
    );
    assert_eq!(commit_count(&origin.path(), DEFAULT_BRANCH).unwrap(), 1);
    assert!(
        head_message(&origin.path(), DEFAULT_BRANCH)
            .unwrap()
            .contains("+3 added")
    );
    assert_eq!(report.trail.first(), Some(&SyncState::Idle));
    assert_eq!(report.trail.last(), Some(&SyncState::Idle));
    assert!(read_lock_meta(&laptop.dir).unwrap().is_none());
}

#[test]
fn two_machines_end_up_with_the_union() {
    let origin = Origin::new();
    let laptop = origin.machine("laptop");
    let desktop = origin.machine("desktop");
    laptop.write_store(&fixture_store("laptop", "l", 3));
    desktop.write_store(&fixture_store("desktop", "d", 2));

    assert!(laptop.backup().is_success());
    let report = desktop.backup();
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.counts.total, 5);
    assert_eq!(report.hosts, vec!["desktop".to_string(), "laptop".to_string()]);

    // laptop catches up without publishing anything new
    let report = laptop.backup();
    assert!(report.is_success(), "{report:?}");
    assert!(report.commit.is_none());
    assert_eq!(report.counts.added, 2);
    assert_eq!(report.counts.unchanged, 3);
    assert_eq!(commit_count(&origin.path(), DEFAULT_BRANCH).unwrap(), 2);
    assert_eq!(laptop.local_bytes(), desktop.local_bytes());
    assert_eq!(laptop.read_store().len(), 5);
}

#[test]
fn concurrent_edits_resolve_to_the_latest_everywhere() {
    let origin = Origin::new();
    let laptop = origin.machine("laptop");
    let desktop = origin.machine("desktop");

    let base = fixture_entry("laptop", "plan", 100, 100, json!({"step": 1}));
    laptop.write_store(&MemoryStore::from_entries([base.clone()]));
    assert!(laptop.backup().is_success());
    assert!(desktop.backup().is_success());

    let mut on_laptop = base.clone();
    on_laptop
        .edit(json!({"step": 2}), memsync::Timestamp::from_unix_millis(200_000).unwrap())
        .unwrap();
    let mut on_desktop = base.clone();
    on_desktop
        .edit(json!({"step": 3}), memsync::Timestamp::from_unix_millis(300_000).unwrap())
        .unwrap();
    laptop.write_store(&MemoryStore::from_entries([on_laptop]));
    desktop.write_store(&MemoryStore::from_entries([on_desktop.clone()]));

    assert!(laptop.backup().is_success());
    let report = desktop.backup();
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.counts.conflicts, 1);
    assert_eq!(report.conflicts[0].id, base.id);

    let report = laptop.backup();
    assert!(report.is_success(), "{report:?}");
    let merged = laptop.read_store();
    assert_eq!(merged.get(&base.id), Some(&on_desktop));

    let published = read_branch_file(&origin.path(), DEFAULT_BRANCH, FILE)
        .unwrap()
        .unwrap();
    assert_eq!(parse_store(&published).unwrap(), merged);
}

#[test]
fn missing_origin_fails_and_restores_the_local_file() {
    let origin = Origin::new();
    let laptop = origin.machine("laptop");
    laptop.write_store(&fixture_store("laptop", "l", 2));
    let before = laptop.local_bytes();
    std::fs::remove_dir_all(origin.path()).unwrap();

    let report = laptop.backup();

    assert_eq!(report.status, ReportStatus::Failed);
    assert!(report.error.is_some());
    assert!(report.backup_path.as_ref().unwrap().exists());
    assert_eq!(laptop.local_bytes(), before);
    assert_eq!(report.trail.last(), Some(&SyncState::Failed));
}
