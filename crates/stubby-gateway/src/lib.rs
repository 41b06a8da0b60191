//! HTTP surface of the shortener: create, redirect, delete and health
//! routes on top of a [`stubby_shortener::Shortener`].

pub mod app;
pub mod error;
pub mod handlers;
pub mod model;
pub mod state;

pub use app::App;
pub use state::AppState;
