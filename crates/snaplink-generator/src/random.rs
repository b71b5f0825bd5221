use crate::Generator;
use rand::RngCore;
use snaplink_core::ShortCode;
use typed_builder::TypedBuilder;

const MIN_ENTROPY_BYTES: usize = 3;
const MAX_ENTROPY_BYTES: usize = 16;

/// Draws short codes from the thread-local CSPRNG and base58-encodes them.
///
/// Six bytes (the default) give 48 bits per code, rendered as 8-9 base58
/// characters.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct RandomGenerator {
    #[builder(default = 6, setter(transform = |bytes: usize| bytes.clamp(MIN_ENTROPY_BYTES, MAX_ENTROPY_BYTES)))]
    entropy_bytes: usize,
}

impl RandomGenerator {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn entropy_bytes(&self) -> usize {
        self.entropy_bytes
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for RandomGenerator {
    type Output = ShortCode;

    fn generate(&self) -> ShortCode {
        let mut bytes = [0u8; MAX_ENTROPY_BYTES];
        let bytes = &mut bytes[..self.entropy_bytes];
        rand::thread_rng().fill_bytes(bytes);
        ShortCode::generated(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_valid_short_codes() {
        let generator = RandomGenerator::new();
        for _ in 0..200 {
            let code = generator.generate();
            assert!(ShortCode::new(code.as_str()).is_ok(), "{code}");
        }
    }

    #[test]
    fn codes_rarely_repeat() {
        let generator = RandomGenerator::new();
        let codes: HashSet<String> = (0..10_000)
            .map(|_| generator.generate().as_str().to_owned())
            .collect();
        assert_eq!(codes.len(), 10_000);
    }

    #[test]
    fn entropy_is_clamped() {
        assert_eq!(RandomGenerator::builder().entropy_bytes(1).build().entropy_bytes(), 3);
        assert_eq!(RandomGenerator::builder().entropy_bytes(64).build().entropy_bytes(), 16);
    }
}
