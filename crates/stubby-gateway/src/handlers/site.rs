use axum::http::StatusCode;

pub async fn index_handler() -> &'static str {
    "Home"
}

pub async fn favicon_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}
