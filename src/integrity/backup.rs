//! Safety-net files written next to each other in the backup directory.
//!
//! - `memory-backup-<ts>.json`: verbatim local bytes taken before a merge
//! - `quarantine-<ts>.json`: entries a merge set aside
//! - `merge-draft-<ts>.json`: a merged store that could not be published
//!
//! Files are written through a temp file and never overwrite an existing
//! name. Nothing here deletes them.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use super::error::IntegrityError;
use super::validate::RejectedEntry;
use crate::core::Timestamp;

/// Where a pre-merge snapshot landed and what it contains.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BackupHandle {
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
    pub created_at: Timestamp,
}

/// Snapshot the local store bytes before anything destructive happens.
pub fn pre_merge_backup(snapshot: &[u8], dest_dir: &Path) -> Result<BackupHandle, IntegrityError> {
    let created_at = Timestamp::now();
    let path = write_unique(dest_dir, "memory-backup", &created_at, snapshot)?;
    let handle = BackupHandle {
        path,
        size: snapshot.len() as u64,
        sha256: hex::encode(Sha256::digest(snapshot)),
        created_at,
    };
    tracing::info!(path = %handle.path.display(), size = handle.size, "pre-merge backup written");
    Ok(handle)
}

#[derive(Serialize)]
struct QuarantineFile<'a> {
    created_at: Timestamp,
    entries: &'a [RejectedEntry],
}

/// Persist rejected entries. Returns `None` when there is nothing to keep.
pub fn quarantine_rejected(
    rejected: &[RejectedEntry],
    dest_dir: &Path,
) -> Result<Option<PathBuf>, IntegrityError> {
    if rejected.is_empty() {
        return Ok(None);
    }
    let created_at = Timestamp::now();
    let mut body = serde_json::to_vec_pretty(&QuarantineFile {
        created_at,
        entries: rejected,
    })?;
    body.push(b'\n');
    let path = write_unique(dest_dir, "quarantine", &created_at, &body)?;
    tracing::warn!(path = %path.display(), count = rejected.len(), "entries quarantined");
    Ok(Some(path))
}

/// Keep a merged store that could not be committed or pushed.
pub fn preserve_draft(bytes: &[u8], dest_dir: &Path) -> Result<PathBuf, IntegrityError> {
    let path = write_unique(dest_dir, "merge-draft", &Timestamp::now(), bytes)?;
    tracing::warn!(path = %path.display(), "merge draft preserved");
    Ok(path)
}

fn write_unique(
    dir: &Path,
    stem: &str,
    at: &Timestamp,
    bytes: &[u8],
) -> Result<PathBuf, IntegrityError> {
    fs::create_dir_all(dir).map_err(|source| IntegrityError::Dir {
        path: dir.to_path_buf(),
        source,
    })?;

    let write_err = |path: &Path, source: io::Error| IntegrityError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| write_err(dir, e))?;
    temp.write_all(bytes).map_err(|e| write_err(temp.path(), e))?;
    temp.as_file().sync_all().map_err(|e| write_err(temp.path(), e))?;

    let base = format!("{stem}-{}", at.to_compact());
    let mut suffix = 0u32;
    loop {
        let name = if suffix == 0 {
            format!("{base}.json")
        } else {
            format!("{base}-{suffix}.json")
        };
        let path = dir.join(name);
        match temp.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                temp = err.file;
                suffix += 1;
            }
            Err(err) => return Err(write_err(&path, err.error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Side;
    use crate::integrity::ValidationIssue;
    use serde_json::json;

    #[test]
    fn backup_is_verbatim_and_described() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = b"{ not even json";
        let handle = pre_merge_backup(bytes, dir.path()).unwrap();

        assert_eq!(fs::read(&handle.path).unwrap(), bytes);
        assert_eq!(handle.size, bytes.len() as u64);
        assert_eq!(handle.sha256, hex::encode(Sha256::digest(bytes)));
        assert!(handle.path.starts_with(dir.path()));
    }

    #[test]
    fn backup_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        let handle = pre_merge_backup(b"{}", &nested).unwrap();
        assert!(handle.path.starts_with(&nested));
    }

    #[test]
    fn name_collisions_get_a_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let at = Timestamp::now();
        let first = write_unique(dir.path(), "memory-backup", &at, b"1").unwrap();
        let second = write_unique(dir.path(), "memory-backup", &at, b"2").unwrap();
        assert_ne!(first, second);
        assert_eq!(fs::read(&first).unwrap(), b"1");
        assert_eq!(fs::read(&second).unwrap(), b"2");
        assert!(second.to_string_lossy().ends_with("-1.json"));
    }

    #[test]
    fn quarantine_is_skipped_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(quarantine_rejected(&[], dir.path()).unwrap(), None);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn quarantine_file_lists_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let rejected = vec![RejectedEntry {
            key: "bogus".into(),
            side: Side::Remote,
            raw: json!({"content": 1}),
            reasons: vec![ValidationIssue::Undecodable {
                reason: "missing field `metadata`".into(),
            }],
        }];
        let path = quarantine_rejected(&rejected, dir.path()).unwrap().unwrap();
        let written: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(written["entries"][0]["key"], "bogus");
        assert_eq!(written["entries"][0]["side"], "remote");
        assert_eq!(written["entries"][0]["reasons"][0]["kind"], "undecodable");
    }

    #[test]
    fn drafts_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = preserve_draft(b"draft", dir.path()).unwrap();
        assert_eq!(fs::read(path).unwrap(), b"draft");
    }
}
