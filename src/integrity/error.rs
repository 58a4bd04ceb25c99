use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::error::{Disposition, Effect};

/// Failures writing the safety-net files.
///
/// All of these abort the run before git or the working copy is touched.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IntegrityError {
    #[error("failed to prepare directory {path:?}: {source}")]
    Dir {
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

    #[error("failed to encode quarantine file: {0}")]
    Encode(#[from] serde_json::Error),
}

impl IntegrityError {
    pub fn disposition(&self) -> Disposition {
        Disposition::Terminal
    }

    pub fn effect(&self) -> Effect {
        match self {
            IntegrityError::Dir { .. } | IntegrityError::Encode(_) => Effect::None,
            // the temp file is cleaned up, but a directory may have been created
            IntegrityError::Write { .. } => Effect::Some,
        }
    }
}
