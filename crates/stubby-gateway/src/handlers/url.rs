use crate::error::Result;
use crate::model::{CreateUrlRequest, CreateUrlResponse};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::Json;
use tracing::debug;

pub async fn create_url_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<CreateUrlRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateUrlResponse>)> {
    let Json(request) = body?;
    let created = state
        .shortener()
        .create_mapping_for(&request.destination, request.owner)
        .await?;

    let status = if created.already_existed {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };

    Ok((
        status,
        Json(CreateUrlResponse {
            short_url: state.short_url(&created.short_code),
            short_code: created.short_code.to_string(),
            destination: created.destination.to_string(),
            already_existed: created.already_existed,
        }),
    ))
}

pub async fn redirect_handler(
    Path(short_code): Path<String>,
    State(state): State<AppState>,
) -> Result<Redirect> {
    let destination = state.shortener().resolve(&short_code).await?;
    debug!(code = %short_code, destination = %destination, "redirecting");
    Ok(Redirect::permanent(destination.as_str()))
}

pub async fn delete_url_handler(
    Path(short_code): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode> {
    state.shortener().remove(&short_code).await?;
    Ok(StatusCode::ACCEPTED)
}
