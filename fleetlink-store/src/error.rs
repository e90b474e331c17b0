//! Error types for the local store.

use std::sync::Arc;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A row could not be decoded into the data model.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Schema setup failed. Every caller that was waiting on the shared
    /// initialisation receives the same underlying error.
    #[error("store initialization failed: {0}")]
    Initialization(Arc<StoreError>),

    /// A blocking store task panicked or was cancelled.
    #[error("store task failed: {0}")]
    TaskJoin(String),
}
