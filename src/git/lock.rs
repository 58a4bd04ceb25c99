//! Per-working-copy sync lock.
//!
//! One sync cycle per repository at a time. The lock is a file in the
//! repository root created with `create_new`; it is not a distributed lock.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::Timestamp;

pub const LOCK_FILE_NAME: &str = ".memsync.lock";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLockMeta {
    pub pid: u32,
    pub host: String,
    pub started_at: Timestamp,
    pub version: String,
}

impl SyncLockMeta {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            pid: std::process::id(),
            host: host.into(),
            started_at: Timestamp::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug)]
pub struct SyncLock {
    path: PathBuf,
    meta: SyncLockMeta,
    released: bool,
}

impl SyncLock {
    pub fn acquire(repo_root: &Path, host: &str) -> Result<Self, SyncLockError> {
        let path = lock_path(repo_root);
        reject_symlink(&path)?;

        let meta = SyncLockMeta::new(host);
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let (meta, meta_error) = match read_metadata(&path) {
                    Ok(meta) => (Some(meta), None),
                    Err(err) => (None, Some(err.to_string())),
                };
                return Err(SyncLockError::Held {
                    path: Box::new(path),
                    meta: meta.map(Box::new),
                    meta_error,
                });
            }
            Err(err) => return Err(SyncLockError::Io(err)),
        };

        let bytes = serde_json::to_vec(&meta).map_err(|source| SyncLockError::MetadataCorrupt {
            path: path.clone(),
            source,
        })?;
        if let Err(err) = file.write_all(&bytes).and_then(|()| file.sync_all()) {
            let _ = fs::remove_file(&path);
            return Err(SyncLockError::Io(err));
        }

        tracing::debug!(path = %path.display(), pid = meta.pid, "sync lock acquired");
        Ok(Self {
            path,
            meta,
            released: false,
        })
    }

    pub fn meta(&self) -> &SyncLockMeta {
        &self.meta
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> Result<(), SyncLockError> {
        if !self.released {
            fs::remove_file(&self.path)?;
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

pub fn lock_path(repo_root: &Path) -> PathBuf {
    repo_root.join(LOCK_FILE_NAME)
}

/// Metadata of the current holder, if any.
pub fn read_lock_meta(repo_root: &Path) -> Result<Option<SyncLockMeta>, SyncLockError> {
    let path = lock_path(repo_root);
    match fs::symlink_metadata(&path) {
        Ok(meta) if meta.file_type().is_symlink() => Err(SyncLockError::Symlink { path }),
        Ok(_) => Ok(Some(read_metadata(&path)?)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(SyncLockError::Io(err)),
    }
}

#[derive(Debug, Error)]
pub enum SyncLockError {
    #[error("sync already running: lock held at {path:?}{}", holder(.meta))]
    Held {
        path: Box<PathBuf>,
        meta: Option<Box<SyncLockMeta>>,
        meta_error: Option<String>,
    },
    #[error("sync lock path is a symlink: {path:?}")]
    Symlink { path: PathBuf },
    #[error("lock metadata corrupted at {path:?}: {source}")]
    MetadataCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

fn holder(meta: &Option<Box<SyncLockMeta>>) -> String {
    match meta {
        Some(meta) => format!(
            " (pid {} on {} since {})",
            meta.pid, meta.host, meta.started_at
        ),
        None => String::new(),
    }
}

fn reject_symlink(path: &Path) -> Result<(), SyncLockError> {
    if let Ok(meta) = fs::symlink_metadata(path)
        && meta.file_type().is_symlink()
    {
        return Err(SyncLockError::Symlink {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn read_metadata(path: &Path) -> Result<SyncLockMeta, SyncLockError> {
    reject_symlink(path)?;
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|source| SyncLockError::MetadataCorrupt {
        path: path.to_path_buf(),
        source,
    })
}
