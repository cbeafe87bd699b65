//! HTTP API routes.

use crate::completion::{ChatCompletion, CompletionRequest};
use crate::error::WrapperError;
use crate::stream::{self, ChunkOptions};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::{sse::Event, IntoResponse, Response, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::unfold;
use ragline_common::{LightRagClient, QueryMode, QueryRequest, WrapperConfig};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::limit::RequestBodyLimitLayer;

/// Largest accepted request body. Clients resend the whole conversation.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Header carrying the wrapper API key.
const API_KEY_HEADER: &str = "x-api-key";

/// Events buffered between the relay task and the response body.
const EVENT_BUFFER: usize = 32;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub client: LightRagClient,
    pub settings: Arc<WrapperConfig>,
}

impl AppState {
    pub fn new(client: LightRagClient, settings: WrapperConfig) -> Self {
        Self {
            client,
            settings: Arc::new(settings),
        }
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), WrapperError> {
        let Some(expected) = self.settings.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Ok(());
        };
        let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
        if provided == Some(expected) {
            Ok(())
        } else {
            Err(WrapperError::Unauthorized)
        }
    }

    fn chunk_options(&self) -> ChunkOptions {
        ChunkOptions {
            words_per_chunk: self.settings.words_per_chunk,
            delay: Duration::from_millis(self.settings.chunk_delay_ms),
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/chat/completions", post(chat_completions))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

// ============ Health Check ============

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "ragline-wrapper",
        "version": env!("CARGO_PKG_VERSION"),
        "lightrag": state.client.url(),
    }))
}

// ============ Chat Completions ============

async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Result<Response, WrapperError> {
    state.authorize(&headers)?;

    let Json(request) =
        payload.map_err(|rejection| WrapperError::InvalidRequest(rejection.body_text()))?;

    let query = request
        .last_user_message()
        .ok_or_else(|| WrapperError::InvalidRequest("No user message found".into()))?;

    let lightrag_request = QueryRequest::new(query, QueryMode::Mix).include_references(false);

    tracing::debug!(
        model = request.model.as_deref().unwrap_or("-"),
        stream = request.wants_stream(),
        messages = request.messages.len(),
        "Completion requested"
    );

    if !request.wants_stream() {
        let answer = state.client.query(&lightrag_request).await?;
        let completion = ChatCompletion::assistant(
            format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            answer,
        );
        return Ok(Json(completion).into_response());
    }

    let stream_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel::<Event>(EVENT_BUFFER);
    tokio::spawn(stream::relay(
        state.client.clone(),
        lightrag_request,
        stream_id,
        state.chunk_options(),
        tx,
    ));

    let events = unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<_, Infallible>(event), rx))
    });

    Ok(Sse::new(events).into_response())
}
