use axum::{http::StatusCode, response::IntoResponse};
use tracing::debug;

use super::error_responses::error_response;

pub async fn not_found() -> impl IntoResponse {
    debug!("router: not_found handler invoked");
    error_response(StatusCode::NOT_FOUND, "Not found")
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK").into_response()
}
