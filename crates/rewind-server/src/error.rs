//! Error types for the status API.
//!
//! [`ApiError`] can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors that can occur in the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// An invalid query parameter was provided.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::InvalidQuery(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
