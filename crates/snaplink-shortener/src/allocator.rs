use std::future::Future;
use std::sync::Arc;

use snaplink_core::{ShortCode, StorageError};
use snaplink_generator::Generator;
use tracing::{debug, warn};

use crate::error::{Result, ShortenerError};

/// Allocates unique short codes by generate-then-insert.
///
/// Each attempt draws a fresh candidate and hands it to an insert that must
/// be a single atomic operation against the store's uniqueness constraint.
/// A [`StorageError::Conflict`] discards the candidate and draws again; any
/// other error ends allocation immediately. The allocator never asks the
/// store whether a code exists: the insert is the only arbiter.
#[derive(Debug)]
pub struct IdentifierAllocator<G> {
    generator: Arc<G>,
    max_attempts: usize,
}

impl<G> Clone for IdentifierAllocator<G> {
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            max_attempts: self.max_attempts,
        }
    }
}

impl<G: Generator> IdentifierAllocator<G> {
    /// A budget of zero is treated as one attempt.
    pub fn new(generator: G, max_attempts: usize) -> Self {
        Self {
            generator: Arc::new(generator),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Runs `insert` with fresh candidates until one is accepted.
    ///
    /// Returns whatever the accepted insert produced, or
    /// [`ShortenerError::AllocationExhausted`] after `max_attempts`
    /// consecutive conflicts.
    pub async fn allocate<T, F, Fut>(&self, mut insert: F) -> Result<T>
    where
        F: FnMut(ShortCode) -> Fut,
        Fut: Future<Output = std::result::Result<T, StorageError>>,
    {
        for attempt in 1..=self.max_attempts {
            let candidate: ShortCode = self.generator.generate().into();

            match insert(candidate).await {
                Ok(inserted) => return Ok(inserted),
                Err(StorageError::Conflict(taken)) => {
                    debug!(attempt, code = %taken, "short code already taken, drawing again");
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(
            attempts = self.max_attempts,
            "short code allocation exhausted"
        );
        Err(ShortenerError::AllocationExhausted {
            attempts: self.max_attempts,
        })
    }
}
