use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use snaplink_core::{RedirectType, ShortCode};

use crate::error::{Result, ShortenerError};

/// Expiration policy for a shortened URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpirationPolicy {
    /// The shortened URL never expires.
    #[default]
    Never,
    /// The shortened URL expires after a certain duration.
    AfterDuration(SignedDuration),
    /// The shortened URL expires at a specific timestamp.
    AtTimestamp(Timestamp),
}

impl ExpirationPolicy {
    /// Resolves the policy into an absolute expiry relative to `now`.
    ///
    /// An expiry that is not strictly in the future is rejected: such a link
    /// could never be redeemed.
    pub fn expire_at(&self, now: Timestamp) -> Result<Option<Timestamp>> {
        let expire_at = match self {
            ExpirationPolicy::Never => return Ok(None),
            ExpirationPolicy::AfterDuration(duration) => now
                .checked_add(*duration)
                .map_err(|e| ShortenerError::InvalidExpiration(e.to_string()))?,
            ExpirationPolicy::AtTimestamp(timestamp) => *timestamp,
        };

        if expire_at <= now {
            return Err(ShortenerError::InvalidExpiration(format!(
                "expiry {expire_at} is not after {now}"
            )));
        }
        Ok(Some(expire_at))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortenParams {
    /// The original URL to be shortened.
    pub original_url: String,
    pub expiration: ExpirationPolicy,
    /// Optional caller-chosen code. Never retried on conflict.
    pub custom_alias: Option<ShortCode>,
    pub redirect_type: RedirectType,
}

impl ShortenParams {
    pub fn new(original_url: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            expiration: ExpirationPolicy::Never,
            custom_alias: None,
            redirect_type: RedirectType::default(),
        }
    }

    pub fn with_alias(mut self, alias: ShortCode) -> Self {
        self.custom_alias = Some(alias);
        self
    }

    pub fn with_expiration(mut self, expiration: ExpirationPolicy) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_redirect_type(mut self, redirect_type: RedirectType) -> Self {
        self.redirect_type = redirect_type;
        self
    }
}
