//! ragline-chat service entry point.

use anyhow::{Context, Result};
use ragline_chat::{
    build_router, collaborator, AppState, ConversationManager, QuestionRules, SessionStore,
};
use ragline_common::config::Config;
use ragline_common::logging::init_logging;
use ragline_common::shutdown::shutdown_signal;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    let config = Config::load_and_validate()?;
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("ragline-chat v{}", env!("CARGO_PKG_VERSION"));

    let conversation = &config.conversation;
    let mut store = SessionStore::new(
        conversation.session_timeout_secs,
        conversation.max_follow_ups,
    );
    if let Some(path) = conversation.resolved_store_path() {
        store = store.with_persistence(path).await;
    }

    let (retriever, language) = collaborator::from_config(&config);
    let manager = ConversationManager::new(
        store,
        retriever,
        language,
        QuestionRules::new(&conversation.rules),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = build_router(
        AppState::new(manager),
        Duration::from_secs(conversation.request_timeout_secs),
    )
    .layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.bind_address(), config.chat_port())
        .parse()
        .context("invalid bind address")?;

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        max_follow_ups = conversation.max_follow_ups,
        "Service initialized in {:?}",
        startup_duration
    );

    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}
