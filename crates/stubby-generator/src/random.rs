use crate::Generator;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stubby_core::{ShortCode, ALPHABET, SHORT_CODE_LENGTH};

/// Draws each character of a code uniformly from the 62-character alphabet.
///
/// The random source is seeded once, at construction, and then shared by
/// every caller. [`RandomGenerator::seeded`] makes the sequence
/// reproducible.
#[derive(Debug)]
pub struct RandomGenerator {
    rng: Mutex<StdRng>,
}

impl RandomGenerator {
    /// Seeds from the operating system.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for RandomGenerator {
    fn generate(&self) -> ShortCode {
        let mut rng = self.rng.lock();
        let code: String = (0..SHORT_CODE_LENGTH)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        ShortCode::new_unchecked(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_well_formed() {
        let generator = RandomGenerator::new();

        for _ in 0..1_000 {
            let code = generator.generate();
            assert!(ShortCode::new(code.as_str()).is_ok(), "bad code {code}");
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let a = RandomGenerator::seeded(42);
        let b = RandomGenerator::seeded(42);

        for _ in 0..10 {
            assert_eq!(a.generate(), b.generate());
        }
    }

    #[test]
    fn consecutive_codes_differ() {
        let generator = RandomGenerator::seeded(7);
        let codes: HashSet<_> = (0..100).map(|_| generator.generate()).collect();
        assert_eq!(codes.len(), 100);
    }

    #[test]
    fn shared_across_threads() {
        let generator = std::sync::Arc::new(RandomGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = std::sync::Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..100).map(|_| generator.generate()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        assert_eq!(all.len(), 400);
    }
}
