//! Scoped guard over the local memory file.
//!
//! The guard remembers the file as it was when the run started. The merged
//! store is staged into the file before push; unless the guard is released
//! after a successful push, dropping it puts the original bytes back.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StashError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path:?} was modified by someone else during the sync")]
    ConcurrentEdit { path: PathBuf },
}

#[derive(Debug)]
pub struct WorkingCopyGuard {
    path: PathBuf,
    original: Option<Vec<u8>>,
    staged: Option<Vec<u8>>,
    released: bool,
}

impl WorkingCopyGuard {
    /// Snapshot the file. A missing file is remembered as absent.
    pub fn capture(path: &Path) -> Result<Self, StashError> {
        let original = read_optional(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            original,
            staged: None,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes at capture time, `None` if the file did not exist.
    pub fn original(&self) -> Option<&[u8]> {
        self.original.as_deref()
    }

    /// Replace the file with `bytes`.
    ///
    /// Refuses if the file no longer holds what this guard last saw.
    pub fn stage(&mut self, bytes: &[u8]) -> Result<(), StashError> {
        let current = read_optional(&self.path)?;
        let expected = self.staged.as_ref().or(self.original.as_ref());
        if current.as_ref() != expected {
            return Err(StashError::ConcurrentEdit {
                path: self.path.clone(),
            });
        }
        if current.as_deref() != Some(bytes) {
            atomic_write(&self.path, bytes)?;
        }
        self.staged = Some(bytes.to_vec());
        Ok(())
    }

    /// Keep whatever was staged.
    pub fn release(mut self) {
        self.released = true;
    }

    fn restore(&self) -> Result<(), StashError> {
        let Some(staged) = &self.staged else {
            return Ok(());
        };
        let current = read_optional(&self.path)?;
        if current.as_ref() != Some(staged) {
            return Err(StashError::ConcurrentEdit {
                path: self.path.clone(),
            });
        }
        match &self.original {
            Some(bytes) => atomic_write(&self.path, bytes),
            None => fs::remove_file(&self.path).map_err(|source| StashError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for WorkingCopyGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.restore() {
            Ok(()) => {
                if self.staged.is_some() {
                    tracing::info!(path = %self.path.display(), "local memory file restored");
                }
            }
            Err(err) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to restore local memory file"
                );
            }
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StashError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StashError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StashError> {
    let write_err = |source: io::Error| StashError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(write_err)?;
    let mut temp = NamedTempFile::new_in(dir).map_err(write_err)?;
    temp.write_all(data).map_err(write_err)?;
    temp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
