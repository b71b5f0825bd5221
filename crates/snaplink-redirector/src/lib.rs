//! Redirect resolution with click counting.
//!
//! [`RedirectorService`] redeems a short code: it checks that the link is
//! active and unexpired and bumps its click counter in one store operation,
//! so a concurrent deactivation or expiry can never be counted.

pub mod redirector;
pub mod service;

pub use redirector::Redirector;
pub use service::RedirectorService;

use snaplink_core::StorageError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RedirectorError {
    /// Missing, deactivated, or expired. The three are deliberately
    /// indistinguishable to callers.
    #[error("short link not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, RedirectorError>;
