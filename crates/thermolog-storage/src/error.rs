//! Storage error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during persistence operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The data root cannot be created or accessed at all
    #[error("Storage unavailable at {path}: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single sensor artifact is missing or malformed
    #[error("Corrupt record {path}: {reason}")]
    RecordCorrupt { path: PathBuf, reason: String },

    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Sensor id cannot be used as a directory name
    #[error("Invalid sensor id: {0:?}")]
    InvalidSensorId(String),

    /// The sensor's writer task is gone
    #[error("Writer for sensor {0} is closed")]
    WriterClosed(String),
}

impl StorageError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StorageError::RecordCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}
