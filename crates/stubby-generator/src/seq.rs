use crate::Generator;
use std::sync::atomic::{AtomicU64, Ordering};
use stubby_core::{ShortCode, ALPHABET, SHORT_CODE_LENGTH};

/// Number of distinct codes: 62^7.
const CODE_SPACE: u64 = 3_521_614_606_208;

/// A deterministic generator walking the code space in order.
///
/// The counter is written in base 62 over the short-code alphabet and padded
/// to the full code length, so 0 is `aaaaaaa`, 1 is `aaaaaab` and so on.
/// The counter wraps at the end of the code space.
#[derive(Debug)]
pub struct SeqGenerator {
    counter: AtomicU64,
}

impl Clone for SeqGenerator {
    fn clone(&self) -> Self {
        Self {
            counter: AtomicU64::new(self.counter.load(Ordering::SeqCst)),
        }
    }
}

impl SeqGenerator {
    pub fn new() -> Self {
        Self::with_offset(0)
    }

    /// Starts from a specific counter value.
    ///
    /// Useful for resuming from a known state or for splitting the code
    /// space into ranges.
    pub fn with_offset(offset: u64) -> Self {
        Self {
            counter: AtomicU64::new(offset),
        }
    }
}

impl Default for SeqGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(mut value: u64) -> String {
    let base = ALPHABET.len() as u64;
    let mut digits = [ALPHABET[0]; SHORT_CODE_LENGTH];
    for slot in digits.iter_mut().rev() {
        *slot = ALPHABET[(value % base) as usize];
        value /= base;
    }
    digits.iter().map(|&b| b as char).collect()
}

impl Generator for SeqGenerator {
    fn generate(&self) -> ShortCode {
        let count = self.counter.fetch_add(1, Ordering::SeqCst);
        ShortCode::new_unchecked(encode(count % CODE_SPACE))
    }
}
