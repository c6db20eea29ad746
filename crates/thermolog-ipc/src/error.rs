//! IPC Error types

use crate::ErrorCode;
use thiserror::Error;

/// Errors that can occur during IPC operations
#[derive(Debug, Error)]
pub enum IpcError {
    /// IO error during socket operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame size exceeded maximum
    #[error("Frame too large (max 4MB)")]
    FrameTooLarge,

    /// Failed to deserialize message
    #[error("Deserialization failed: {0}")]
    Deserialize(#[from] rmp_serde::decode::Error),

    /// Failed to serialize message
    #[error("Serialization failed: {0}")]
    Serialize(#[from] rmp_serde::encode::Error),

    /// Request timed out
    #[error("Request timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Daemon not running
    #[error("Daemon not running (socket not found)")]
    DaemonNotRunning,

    /// Daemon answered with an error response
    #[error("Daemon rejected request ({code:?}): {message}")]
    Rejected { code: ErrorCode, message: String },

    /// Daemon answered with a response of the wrong shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}
