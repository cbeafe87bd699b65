//! Error types for ragline-chat.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Conversation service errors.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Request timed out")]
    RequestTimeout,

    #[error("Collaborator failed: {0}")]
    Collaborator(#[from] ragline_common::Error),
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ChatError::InvalidSessionId(_) => (StatusCode::BAD_REQUEST, "INVALID_SESSION_ID"),
            ChatError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ChatError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
            ChatError::RequestTimeout => (StatusCode::GATEWAY_TIMEOUT, "REQUEST_TIMEOUT"),
            ChatError::Collaborator(e) if e.is_timeout() => {
                (StatusCode::GATEWAY_TIMEOUT, "COLLABORATOR_TIMEOUT")
            }
            ChatError::Collaborator(_) => (StatusCode::BAD_GATEWAY, "COLLABORATOR_ERROR"),
        };

        if status.is_server_error() {
            tracing::error!(code, error = %self, "Request failed");
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
