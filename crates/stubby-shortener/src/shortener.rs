use crate::error::Result;
use async_trait::async_trait;
use stubby_core::{Destination, ShortCode};

/// Outcome of a create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub short_code: ShortCode,
    /// The normalized destination that was stored.
    pub destination: Destination,
    /// `true` when the destination was already registered and its existing
    /// code was returned.
    pub already_existed: bool,
}

#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Registers `destination` (or finds its existing code).
    async fn create_mapping(&self, destination: &str) -> Result<Created> {
        self.create_mapping_for(destination, None).await
    }

    /// Same as [`Shortener::create_mapping`], recording an unenforced owner.
    async fn create_mapping_for(&self, destination: &str, owner: Option<String>)
        -> Result<Created>;

    /// Returns the destination bound to `code`.
    async fn resolve(&self, code: &str) -> Result<Destination>;

    /// Removes the mapping for `code`.
    async fn remove(&self, code: &str) -> Result<()>;

    /// Whether the storage backend is reachable.
    async fn backend_health(&self) -> bool;
}
