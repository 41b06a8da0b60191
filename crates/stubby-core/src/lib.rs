//! Core types and traits for the Stubby URL shortener.
//!
//! This crate provides the types shared by the storage backends, the
//! shortener service and the HTTP gateway: the validated [`ShortCode`] and
//! [`Destination`] values, the [`UrlMapping`] entity and the [`UrlStore`]
//! contract every backend implements.

pub mod destination;
pub mod error;
pub mod shortcode;
pub mod store;

pub use destination::Destination;
pub use error::{CoreError, StorageError};
pub use shortcode::{ShortCode, ALPHABET, SHORT_CODE_LENGTH};
pub use store::{ConsistencyLevel, UrlMapping, UrlStore};
