use super::AppState;
use super::handler::{handle_chat_completions, handle_health};
use crate::config::Config;
use anyhow::{Context, Result};
use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Bind `host:port` and serve until the process stops.
pub async fn run_gateway(host: &str, port: u16, config: Arc<Config>) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("parse gateway bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind gateway socket")?;

    run_gateway_with_listener(listener, config).await
}

/// Serve on a pre-bound listener.
pub async fn run_gateway_with_listener(
    listener: tokio::net::TcpListener,
    config: Arc<Config>,
) -> Result<()> {
    let local = listener
        .local_addr()
        .context("get gateway listener local address")?;
    tracing::info!(
        address = %local,
        deployment = %config.gateway.deployment,
        "gateway listening"
    );
    println!("Gateway listening on {local}");
    println!(
        "  POST /openai/deployments/{}/chat/completions",
        config.gateway.deployment
    );
    println!("  GET  /health");

    let app = build_app(AppState { config });
    axum::serve(listener, app)
        .await
        .context("serve HTTP gateway")?;

    Ok(())
}

pub fn build_app(state: AppState) -> Router {
    let max_body_bytes = state.config.gateway.max_body_bytes;
    let timeout = Duration::from_secs(state.config.gateway.request_timeout_secs);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/openai/deployments/{deployment}/chat/completions",
            post(handle_chat_completions),
        )
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
}
