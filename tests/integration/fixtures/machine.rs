//! A shared bare origin plus per-host clones, each running the backup
//! workflow against it.

use std::fs;
use std::path::PathBuf;

use memsync::core::{MemoryStore, parse_store, serialize_store};
use memsync::git::DEFAULT_BRANCH;
use memsync::{BackupManager, BackupReport, RetryPolicy, WorkflowOptions};
use tempfile::TempDir;

use super::git::{init_bare_repo, init_repo_with_origin};

pub const FILE: &str = ".memory/store.json";

pub struct Origin {
    pub root: TempDir,
}

impl Origin {
    pub fn new() -> Self {
        let root = TempDir::new().expect("tempdir");
        init_bare_repo(&root.path().join("origin.git")).expect("init origin");
        Self { root }
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().join("origin.git")
    }

    pub fn machine(&self, host: &str) -> Machine {
        let dir = self.root.path().join(host);
        fs::create_dir_all(&dir).expect("machine dir");
        init_repo_with_origin(&dir, &self.path()).expect("init clone");
        Machine {
            host: host.to_string(),
            dir,
        }
    }
}

pub struct Machine {
    pub host: String,
    pub dir: PathBuf,
}

impl Machine {
    pub fn local_path(&self) -> PathBuf {
        self.dir.join(FILE)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.dir.join(".memsync-backups")
    }

    pub fn write_store(&self, store: &MemoryStore) {
        let path = self.local_path();
        fs::create_dir_all(path.parent().expect("file has a parent")).expect("mkdir");
        fs::write(&path, serialize_store(store).expect("serialize")).expect("write store");
    }

    pub fn read_store(&self) -> MemoryStore {
        parse_store(&fs::read(self.local_path()).expect("read store")).expect("parse store")
    }

    pub fn local_bytes(&self) -> Vec<u8> {
        fs::read(self.local_path()).expect("read store")
    }

    pub fn options(&self) -> WorkflowOptions {
        let mut options = WorkflowOptions::new(&self.host, &self.dir, FILE, self.backup_dir());
        options.fetch_retry = RetryPolicy::immediate(2);
        options.push_retry = RetryPolicy::immediate(2);
        options
    }

    pub fn backup(&self) -> BackupReport {
        let manager = BackupManager::open(self.options(), "origin").expect("open repo");
        manager.run_backup(&self.local_path(), DEFAULT_BRANCH)
    }
}

