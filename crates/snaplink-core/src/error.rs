use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors reported by a durable store.
///
/// `Conflict` and `MissingReference` are the variants callers branch on:
/// they report a uniqueness constraint or a reference check rejecting a
/// write. Everything else is transport or data trouble and is propagated
/// as is.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("referenced record is missing or deleted: {0}")]
    MissingReference(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

/// Errors produced while listing a page of records.
#[derive(Debug, Clone, Error)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
