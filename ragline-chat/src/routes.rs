//! HTTP API routes.

use crate::error::ChatError;
use crate::manager::ConversationManager;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ragline_common::logging::generate_trace_id;
use ragline_common::request_span;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::Instrument;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConversationManager>,
}

impl AppState {
    pub fn new(manager: ConversationManager) -> Self {
        Self {
            manager: Arc::new(manager),
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/chat", post(chat))
        .route("/reset", post(reset))
        .route("/sessions/:id", get(get_session))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(map_response(timeout_body))
        .with_state(state)
}

/// The timeout layer answers with an empty 408.
async fn timeout_body(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        return ChatError::RequestTimeout.into_response();
    }
    response
}

/// Turn a body rejection into the service's error shape.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ChatError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ChatError::InvalidRequest(rejection.body_text()))
}

// ============ Health Check ============

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "ragline-chat",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.manager.store().len().await,
    }))
}

// ============ Chat ============

#[derive(Debug, Deserialize)]
struct ChatRequest {
    session_id: String,
    message: String,
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ChatError> {
    let request = json_body(payload)?;
    let span = request_span!("chat", generate_trace_id(), session_id = %request.session_id);

    let reply = state
        .manager
        .handle_message(&request.session_id, &request.message)
        .instrument(span)
        .await?;

    Ok(Json(reply))
}

// ============ Reset ============

#[derive(Debug, Deserialize)]
struct ResetRequest {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct ResetResponse {
    status: &'static str,
    session_id: String,
    existed: bool,
}

async fn reset(
    State(state): State<AppState>,
    payload: Result<Json<ResetRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ChatError> {
    let request = json_body(payload)?;
    let existed = state.manager.reset(&request.session_id).await?;

    Ok(Json(ResetResponse {
        status: "cleared",
        session_id: request.session_id.trim().to_string(),
        existed,
    }))
}

// ============ Session Inspection ============

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ChatError> {
    let session = state
        .manager
        .session(&id)
        .await?
        .ok_or_else(|| ChatError::SessionNotFound(id))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": session
    })))
}
