use crate::error::PaginationError;
use crate::record::RecordId;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A pagination coordinate.
///
/// Listings are ordered newest first, i.e. by `(created_at DESC, id DESC)`.
/// The derived `Ord` is the ascending form of that same lexicographic
/// order, so "newest first" is simply the reverse of `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Position {
    pub created_at: Timestamp,
    pub id: RecordId,
}

impl Position {
    pub const fn new(created_at: Timestamp, id: RecordId) -> Self {
        Self { created_at, id }
    }
}

/// A record that occupies a position in a keyset listing.
pub trait Keyed {
    fn position(&self) -> Position;
}

/// An opaque, URL-safe token that encodes exactly one [`Position`].
///
/// Callers hand it back verbatim to resume a listing. The payload is
/// unpadded base64url over a small JSON object and is not a stable
/// format: it only has to survive until the next page request.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Encodes a position into a cursor token.
    pub fn encode(position: &Position) -> Self {
        let payload =
            serde_json::to_vec(position).expect("a timestamp and an integer always serialize");
        Self(URL_SAFE_NO_PAD.encode(payload))
    }

    /// Decodes a cursor token back into the position it was built from.
    ///
    /// Fails with [`PaginationError::InvalidCursor`] when the token is not
    /// base64url, is not a JSON object of the expected shape, or lacks
    /// either field. It never checks whether the position still exists.
    pub fn decode(token: &str) -> Result<Position, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| PaginationError::InvalidCursor(format!("not base64url: {e}")))?;

        serde_json::from_slice::<Position>(&bytes)
            .map_err(|e| PaginationError::InvalidCursor(format!("malformed payload: {e}")))
    }

    /// Decodes this cursor.
    pub fn position(&self) -> Result<Position, PaginationError> {
        Self::decode(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Cursor").field(&self.0).finish()
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
