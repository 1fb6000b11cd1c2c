//! Error types for storage drivers.

use std::io;
use thiserror::Error;

/// Result type for storage-driver operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage drivers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No blob exists for the given handle.
    #[error("no blob for handle {handle:?}")]
    NotFound {
        /// The handle that resolved to nothing.
        handle: String,
    },

    /// Stored content could not be parsed.
    #[error("stored content corrupted: {0}")]
    Corrupted(String),

    /// The exclusive store lock could not be acquired in time.
    #[error("exclusive lock not acquired within {waited_ms} ms")]
    LockTimeout {
        /// How long the caller waited, in milliseconds.
        waited_ms: u64,
    },

    /// JSON (de)serialisation failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    /// Creates a not-found error for a handle.
    pub fn not_found(handle: impl Into<String>) -> Self {
        Self::NotFound {
            handle: handle.into(),
        }
    }

    /// Creates a corrupted-content error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}
