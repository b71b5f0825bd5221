use crate::Result;
use async_trait::async_trait;
use jiff::Timestamp;
use snaplink_core::{Redirection, ShortCode};

#[async_trait]
pub trait Redirector: Send + Sync + 'static {
    /// Redeems `code` at `now`: counts one click and returns where to go.
    /// Fails with `NotFound` if the link is missing, inactive or expired.
    async fn redeem_at(&self, code: &ShortCode, now: Timestamp) -> Result<Redirection>;
}
