use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use stubby_shortener::ShortenerError;
use tracing::{debug, error};

use crate::model::ErrorResponse;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    /// The request body could not be read as the expected JSON.
    Body(JsonRejection),
    Shortener(ShortenerError),
}

impl From<JsonRejection> for AppError {
    fn from(value: JsonRejection) -> Self {
        AppError::Body(value)
    }
}

impl From<ShortenerError> for AppError {
    fn from(value: ShortenerError) -> Self {
        AppError::Shortener(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Body(rejection) => {
                debug!(error = %rejection.body_text(), "rejected request body");
                (StatusCode::BAD_REQUEST, rejection.body_text())
            }
            AppError::Shortener(err) => {
                let status = match &err {
                    ShortenerError::Validation(_) => StatusCode::BAD_REQUEST,
                    ShortenerError::NotFound(_) => StatusCode::NOT_FOUND,
                    ShortenerError::CodeSpaceExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    ShortenerError::Storage(source) => {
                        error!(error = %err, source = %source, "request failed on storage");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                // Storage detail only reaches the log.
                (status, err.to_string())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
