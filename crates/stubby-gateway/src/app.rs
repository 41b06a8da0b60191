use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    create_url_handler, delete_url_handler, favicon_handler, health_handler, index_handler,
    redirect_handler,
};
use crate::state::AppState;

pub struct App {}

impl App {
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/", get(index_handler))
            .route("/favicon.ico", get(favicon_handler))
            .route("/health", get(health_handler))
            .route("/{short_code}", get(redirect_handler))
            .nest(
                "/api/v1",
                Router::new()
                    .route("/add", post(create_url_handler))
                    .route("/{short_code}", delete(delete_url_handler)),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}
