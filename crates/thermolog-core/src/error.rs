//! Core error types.

use thermolog_ipc::ErrorCode;
use thermolog_storage::StorageError;
use thiserror::Error;

/// Errors raised by the sensor store, ingestion and settings paths.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Inbound payload is not a JSON object with a finite numeric temperature
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Sensor id does not exist
    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    /// Sensor id cannot be stored
    #[error("Invalid sensor id: {0:?}")]
    InvalidSensorId(String),

    /// Persisting a mutation failed; the in-memory state already holds it
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CoreError {
    /// Wire error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::InvalidPayload(_) | CoreError::InvalidSensorId(_) => {
                ErrorCode::InvalidRequest
            }
            CoreError::UnknownSensor(_) => ErrorCode::UnknownSensor,
            CoreError::Storage(_) => ErrorCode::StorageError,
        }
    }
}
