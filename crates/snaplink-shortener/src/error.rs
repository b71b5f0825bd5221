use snaplink_core::shortcode::InvalidShortCode;
use snaplink_core::{PaginationError, StorageError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShortenerError>;

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid expiration: {0}")]
    InvalidExpiration(String),
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("alias already exists: {0}")]
    AliasConflict(String),
    /// Every candidate drawn was already taken. Points at a generator whose
    /// entropy is too small for the namespace, or an attempt budget set too
    /// low; retrying the same request immediately is unlikely to help.
    #[error("no free short code after {attempts} attempts")]
    AllocationExhausted { attempts: usize },
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("short link not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<InvalidShortCode> for ShortenerError {
    fn from(value: InvalidShortCode) -> Self {
        Self::InvalidShortCode(value.0)
    }
}

impl From<PaginationError> for ShortenerError {
    fn from(value: PaginationError) -> Self {
        match value {
            PaginationError::InvalidCursor(message) => Self::InvalidCursor(message),
            PaginationError::Storage(err) => Self::Storage(err),
        }
    }
}
