pub mod random;
pub mod seq;

pub use random::RandomGenerator;
pub use seq::SeqGenerator;

use stubby_core::ShortCode;

/// Trait for generating short code candidates.
///
/// Implementations are pure generators that don't interact with storage.
/// A candidate may already be taken; the caller probes the store and asks
/// again.
pub trait Generator: Send + Sync + 'static {
    /// Generates a well-formed candidate short code.
    fn generate(&self) -> ShortCode;
}

impl<G: Generator + ?Sized> Generator for Box<G> {
    fn generate(&self) -> ShortCode {
        (**self).generate()
    }
}
