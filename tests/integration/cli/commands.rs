//! Runs the `memsync` binary against temp files and repositories.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use memsync::core::{MemoryStore, parse_store, serialize_store};
use memsync::git::DEFAULT_BRANCH;
use memsync::test_harness::{fixture_entry, fixture_store};
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::fixtures::git::read_branch_file;
use crate::fixtures::machine::{FILE, Origin};

fn memsync(home: &Path) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("memsync");
    cmd.current_dir(home);
    cmd.env("MEMSYNC_CONFIG_DIR", home.join("config"));
    cmd.env("MEMSYNC_DATA_DIR", home.join("data"));
    cmd.env_remove("MEMSYNC_LOG");
    cmd.env_remove("MEMSYNC_HOST");
    cmd
}

fn write(path: &Path, store: &MemoryStore) {
    fs::write(path, serialize_store(store).unwrap()).unwrap();
}

#[test]
fn id_prints_the_composite_id() {
    let home = TempDir::new().unwrap();
    memsync(home.path())
        .args(["--host", "laptop", "id", "--original-id", "n1"])
        .args(["--created-at", "2025-01-02T03:04:05Z"])
        .assert()
        .success()
        .stdout("laptop:n1:20250102T030405.000000000Z\n");
}

#[test]
fn id_rejects_reserved_delimiters() {
    let home = TempDir::new().unwrap();
    memsync(home.path())
        .args(["--host", "laptop", "id", "--original-id", "a:b"])
        .args(["--created-at", "20250102T030405.000000000Z"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("reserved delimiter"));
}

#[test]
fn validate_reports_tampered_entries() {
    let home = TempDir::new().unwrap();
    let clean = home.path().join("clean.json");
    write(&clean, &fixture_store("laptop", "l", 3));
    memsync(home.path())
        .args(["validate"])
        .arg(&clean)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 entries valid"));

    let mut bad = fixture_entry("laptop", "bad", 10, 10, json!("original"));
    bad.content = json!("edited by hand");
    let tampered = home.path().join("tampered.json");
    write(&tampered, &MemoryStore::from_entries([bad]));
    memsync(home.path())
        .args(["validate"])
        .arg(&tampered)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("checksum mismatch"));
}

#[test]
fn validate_json_lists_issue_kinds() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("store.json");
    fs::write(
        &path,
        r#"{"schema_version": 1, "entries": {"not-an-id": {"content": 1}}}"#,
    )
    .unwrap();

    let out = memsync(home.path())
        .args(["--json", "validate"])
        .arg(&path)
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["entries"], 1);
    assert_eq!(report["invalid"][0]["key"], "not-an-id");
    assert_eq!(report["invalid"][0]["issues"][0]["kind"], "undecodable");
}

#[test]
fn merge_writes_the_union_to_a_file() {
    let home = TempDir::new().unwrap();
    let local = home.path().join("local.json");
    let remote = home.path().join("remote.json");
    let out = home.path().join("out").join("merged.json");
    write(&local, &fixture_store("laptop", "l", 2));
    write(&remote, &fixture_store("desktop", "d", 3));

    memsync(home.path())
        .arg("merge")
        .args([&local, &remote])
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("5 entries: +5 added"));

    let merged = parse_store(&fs::read(&out).unwrap()).unwrap();
    assert_eq!(merged.len(), 5);
}

#[test]
fn merge_without_out_streams_the_store() {
    let home = TempDir::new().unwrap();
    let local = home.path().join("local.json");
    let remote = home.path().join("remote.json");
    write(&local, &fixture_store("laptop", "l", 1));
    write(&remote, &MemoryStore::new());

    let output = memsync(home.path())
        .arg("merge")
        .args([&local, &remote])
        .assert()
        .success()
        .stderr(predicate::str::contains("Merged with host_lexicographic"))
        .get_output()
        .stdout
        .clone();
    assert_eq!(output, fs::read(&local).unwrap());
}

#[test]
fn merge_refuses_unparseable_input() {
    let home = TempDir::new().unwrap();
    let local = home.path().join("local.json");
    let remote = home.path().join("remote.json");
    fs::write(&local, b"{ not json").unwrap();
    write(&remote, &MemoryStore::new());

    memsync(home.path())
        .arg("merge")
        .args([&local, &remote])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn backup_publishes_through_the_configured_remote() {
    let origin = Origin::new();
    let laptop = origin.machine("laptop");
    laptop.write_store(&fixture_store("laptop", "l", 2));

    let out = memsync(origin.root.path())
        .arg("--repo")
        .arg(&laptop.dir)
        .args(["--host", "laptop", "--json", "backup"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["status"], "success");
    assert_eq!(report["counts"]["added"], 2);
    assert_eq!(
        read_branch_file(&origin.path(), DEFAULT_BRANCH, FILE).unwrap(),
        Some(laptop.local_bytes())
    );
    let backups = origin.root.path().join("data").join("backups");
    assert!(fs::read_dir(backups).unwrap().next().is_some());
}

#[test]
fn backup_honors_the_repo_config_file() {
    let origin = Origin::new();
    let laptop = origin.machine("laptop");
    fs::write(
        laptop.dir.join("memsync.toml"),
        "[sync]\nbranch = \"team/memory\"\nfile = \"notes.json\"\n",
    )
    .unwrap();
    write(&laptop.dir.join("notes.json"), &fixture_store("laptop", "n", 1));

    memsync(&laptop.dir)
        .args(["--host", "laptop", "backup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup success"));

    assert!(
        read_branch_file(&origin.path(), "team/memory", "notes.json")
            .unwrap()
            .is_some()
    );
    assert!(
        read_branch_file(&origin.path(), DEFAULT_BRANCH, FILE)
            .unwrap()
            .is_none()
    );
}

#[test]
fn backup_outside_a_repository_still_reports() {
    let home = TempDir::new().unwrap();
    let out = memsync(home.path())
        .args(["--host", "laptop", "--json", "backup"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let report: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["status"], "failed");
    assert_eq!(report["host"], "laptop");
    assert_eq!(report["error"]["kind"], "git");
    assert!(
        report["guidance"]
            .as_str()
            .unwrap()
            .contains("No git repository")
    );
}
