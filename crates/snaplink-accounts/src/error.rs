use snaplink_core::{PaginationError, StorageError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AccountError>;

#[derive(Debug, Clone, Error)]
pub enum AccountError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("email already exists: {0}")]
    EmailConflict(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<PaginationError> for AccountError {
    fn from(value: PaginationError) -> Self {
        match value {
            PaginationError::InvalidCursor(message) => Self::InvalidCursor(message),
            PaginationError::Storage(err) => Self::Storage(err),
        }
    }
}
