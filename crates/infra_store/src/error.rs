//! Store error types

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use core_kernel::PortError;

/// Errors raised while reading or writing claim-run artefacts
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Artefact could not be encoded or decoded
    #[error("Serialization error on {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Append-only artefact already present
    #[error("Artefact already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Artefact not found: {0}")]
    NotFound(PathBuf),

    /// Blocking filesystem task did not complete
    #[error("Store task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return StoreError::NotFound(path.to_path_buf());
        }
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn serialization(path: &Path, source: serde_json::Error) -> Self {
        StoreError::Serialization {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<StoreError> for PortError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(path) => PortError::not_found("artefact", path.display()),
            StoreError::AlreadyExists(path) => {
                PortError::conflict(format!("{} already exists", path.display()))
            }
            StoreError::Serialization { .. } => PortError::transformation(error.to_string()),
            StoreError::Io { .. } => PortError::connection(error.to_string()),
            StoreError::Task(message) => PortError::internal(message),
        }
    }
}
