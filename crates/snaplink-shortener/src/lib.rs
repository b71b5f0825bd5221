//! URL shortening: short code allocation plus link administration.
//!
//! [`IdentifierAllocator`] hands out collision-free codes by letting the
//! store's uniqueness constraint arbitrate, and [`ShortenerService`] builds
//! shorten / list / get / deactivate on top of it.

pub mod allocator;
pub mod error;
pub mod params;
pub mod service;

pub use allocator::IdentifierAllocator;
pub use error::{Result, ShortenerError};
pub use params::{ExpirationPolicy, ShortenParams};
pub use service::{ShortenerService, ShortenerSettings};
