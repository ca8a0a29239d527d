use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

use crate::db::models::DrawError;

/// Errors a handler may surface to the client. Read endpoints never produce
/// one; only the write endpoint rejects input.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid draw: {0}")]
    InvalidDraw(#[from] DrawError),

    #[error("request body must be a JSON draw object")]
    BadBody,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::InvalidDraw(_) | AppError::BadBody => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
