//! ragline-wrapper service entry point.

use anyhow::{Context, Result};
use ragline_common::config::Config;
use ragline_common::logging::init_logging;
use ragline_common::shutdown::shutdown_signal;
use ragline_common::LightRagClient;
use ragline_wrapper::{build_router, AppState};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_and_validate()?;
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("ragline-wrapper v{}", env!("CARGO_PKG_VERSION"));

    let client = LightRagClient::new(&config.lightrag);
    tracing::info!(
        lightrag = %config.lightrag.url,
        stream = %config.lightrag.stream_url(),
        auth = config.wrapper.api_key.is_some(),
        "LightRAG endpoints configured"
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = build_router(AppState::new(client, config.wrapper.clone())).layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.bind_address(), config.wrapper_port())
        .parse()
        .context("invalid bind address")?;

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
