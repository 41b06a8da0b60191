use thiserror::Error;

/// Errors raised while constructing core values from untrusted input.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("url is not valid: {0}")]
    InvalidUrl(String),
}

/// Errors returned by [`UrlStore`](crate::UrlStore) backends.
///
/// Backends never hide inconsistency: a write that lands in one direction
/// but not the other is reported as [`StorageError::PartialWrite`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("key already bound: {0}")]
    Conflict(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("mapping written in one direction only: {0}")]
    PartialWrite(String),
    #[error("store directions disagree: {0}")]
    Inconsistent(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

impl StorageError {
    /// Returns `true` for a missing key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}
