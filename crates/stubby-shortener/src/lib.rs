//! URL shortener service implementation.
//!
//! This crate provides the registration protocol that binds destinations to
//! generated short codes, plus the lookup and removal paths. Storage and
//! code generation are injected; core types are re-exported from
//! `stubby_core`.

pub mod error;
pub mod service;
pub mod settings;
pub mod shortener;

pub use error::ShortenerError;
pub use service::ShortenerService;
pub use settings::ShortenerSettings;
pub use shortener::{Created, Shortener};
pub use stubby_core::{Destination, ShortCode};
