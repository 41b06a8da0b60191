use stubby_core::{CoreError, StorageError};
use thiserror::Error;

pub type Result<T, E = ShortenerError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error(transparent)]
    Validation(#[from] CoreError),
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("no free short code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },
    /// Backend detail stays in the source chain, out of the message.
    #[error("storage backend failure")]
    Storage(#[source] StorageError),
}

impl ShortenerError {
    /// The underlying storage error, if this is a storage failure.
    pub fn storage(&self) -> Option<&StorageError> {
        match self {
            ShortenerError::Storage(inner) => Some(inner),
            _ => None,
        }
    }
}
