use crate::destination::Destination;
use crate::error::StorageError;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A short code bound to its destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMapping {
    pub short_code: ShortCode,
    pub destination: Destination,
    /// Free-form owner attribute. Stored, never enforced.
    pub owner: Option<String>,
}

impl UrlMapping {
    pub fn new(short_code: ShortCode, destination: Destination) -> Self {
        Self {
            short_code,
            destination,
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: Option<String>) -> Self {
        self.owner = owner;
        self
    }
}

/// How a backend keeps the two directions of a mapping in step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsistencyLevel {
    /// Both directions are written and removed inside one transaction.
    Atomic,
    /// Each direction is a separate write. A failure between the two leaves
    /// a one-directional mapping behind.
    PerKey,
    /// Both directions live in one row. Writes are atomic; deletes read the
    /// row first and remove it in a second round trip.
    SingleRow,
}

impl ConsistencyLevel {
    /// Whether `put` can never leave only one direction written.
    pub fn atomic_put(self) -> bool {
        matches!(self, ConsistencyLevel::Atomic | ConsistencyLevel::SingleRow)
    }

    /// Whether `delete` checks and removes in a single step.
    pub fn atomic_delete(self) -> bool {
        matches!(self, ConsistencyLevel::Atomic)
    }
}

impl Display for ConsistencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsistencyLevel::Atomic => f.write_str("atomic"),
            ConsistencyLevel::PerKey => f.write_str("per-key"),
            ConsistencyLevel::SingleRow => f.write_str("single-row"),
        }
    }
}

/// Bidirectional short code <-> destination store.
///
/// Every backend implements the same contract; what differs is the
/// [`ConsistencyLevel`] it can offer, which each backend reports instead of
/// hiding. Implementations must be safe to share between concurrent request
/// handlers.
#[async_trait]
pub trait UrlStore: Send + Sync + 'static {
    /// Short backend name used in logs.
    fn backend(&self) -> &'static str;

    /// The guarantee this backend gives for the two directions of a mapping.
    fn consistency(&self) -> ConsistencyLevel;

    /// Establishes the backend handle. Calling it on an open store is a no-op.
    ///
    /// Returns [`StorageError::Unavailable`] when the underlying resource
    /// cannot be created, reached or migrated.
    async fn open(&self) -> Result<()>;

    /// Releases the backend handle. Later operations fail with
    /// [`StorageError::Unavailable`] until the store is opened again.
    async fn close(&self) -> Result<()>;

    /// Liveness probe. Never errors.
    async fn health(&self) -> bool;

    /// Returns the destination bound to `code`, or [`StorageError::NotFound`].
    async fn get_destination(&self, code: &ShortCode) -> Result<Destination>;

    /// Returns the code bound to `destination`, or [`StorageError::NotFound`].
    async fn get_short_code(&self, destination: &Destination) -> Result<ShortCode>;

    /// Writes both directions of `mapping`.
    ///
    /// Fails with [`StorageError::Conflict`] if either the code or the
    /// destination is already bound; an existing mapping is never replaced.
    async fn put(&self, mapping: &UrlMapping) -> Result<()>;

    /// Removes both directions of the mapping for `code`.
    ///
    /// Fails with [`StorageError::NotFound`] if the code is unknown.
    async fn delete(&self, code: &ShortCode) -> Result<()>;
}
