//! Error types for ragline-wrapper.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum WrapperError {
    #[error("Invalid wrapper API key")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("LightRAG request failed: {0}")]
    Upstream(#[from] ragline_common::Error),
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl IntoResponse for WrapperError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            WrapperError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            WrapperError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            WrapperError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
        };

        if status.is_server_error() {
            tracing::error!(code, error = %self, "Completion failed");
        }

        let body = serde_json::json!({
            "success": false,
            "error": ApiError {
                code: code.to_string(),
                message: self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
