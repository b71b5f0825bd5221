use std::sync::Arc;

use crate::redirector::Redirector;
use crate::{RedirectorError, Result};
use async_trait::async_trait;
use jiff::Timestamp;
use snaplink_core::{LinkRepository, Redirection, ShortCode};
use tracing::{debug, trace};

/// Service for handling URL redirects.
#[derive(Debug)]
pub struct RedirectorService<R> {
    repository: Arc<R>,
}

impl<R> Clone for RedirectorService<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<R: LinkRepository> RedirectorService<R> {
    pub fn new(repository: R) -> Self {
        Self::from_shared(Arc::new(repository))
    }

    pub fn from_shared(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Redeems a short code against the current time.
    pub async fn redeem(&self, code: &ShortCode) -> Result<Redirection> {
        Redirector::redeem_at(self, code, Timestamp::now()).await
    }

    /// Redeems a code as typed by a client. Codes that could never have
    /// been issued are reported as `NotFound` without touching the store.
    pub async fn redeem_str(&self, code: &str) -> Result<Redirection> {
        match ShortCode::new(code) {
            Ok(code) => self.redeem(&code).await,
            Err(_) => Err(RedirectorError::NotFound(code.to_string())),
        }
    }
}

#[async_trait]
impl<R: LinkRepository> Redirector for RedirectorService<R> {
    async fn redeem_at(&self, code: &ShortCode, now: Timestamp) -> Result<Redirection> {
        trace!(code = %code, "redeeming short code");

        match self.repository.redeem(code, now).await? {
            Some(redirection) => {
                debug!(code = %code, url = %redirection.original_url, "redeemed short code");
                Ok(redirection)
            }
            None => {
                debug!(code = %code, "short code not redeemable");
                Err(RedirectorError::NotFound(code.to_string()))
            }
        }
    }
}
