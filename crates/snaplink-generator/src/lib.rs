//! Short code generators.
//!
//! Generators are pure: they never consult storage. Uniqueness is settled
//! by the store's constraint at insert time, so a generator only has to make
//! collisions unlikely, not impossible.

pub mod random;
pub mod seq;

pub use random::RandomGenerator;
pub use seq::SeqGenerator;

use snaplink_core::ShortCode;

/// Trait for generating short code candidates.
pub trait Generator: Send + Sync + 'static {
    type Output: Into<ShortCode>;

    /// Produces a fresh candidate. Successive calls are independent draws.
    fn generate(&self) -> Self::Output;
}
