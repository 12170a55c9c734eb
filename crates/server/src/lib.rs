//! Presence Relay Server Library
//!
//! Real-time presence directory and friendship-gated message relay over
//! WebSocket, mirroring presence into a durable record store.

pub mod chat;
pub mod core;

use axum::http::{HeaderValue, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::core::store::open_store;
use crate::core::{AppState, RelayConfig};

/// Install the global tracing subscriber. Later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn cors_layer(config: &RelayConfig) -> anyhow::Result<CorsLayer> {
    let Some(origin) = &config.allowed_origin else {
        return Ok(CorsLayer::permissive());
    };

    Ok(CorsLayer::new()
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST])
        .allow_credentials(true))
}

/// Build the full application router around `state`.
pub fn app(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config)?;

    Ok(Router::new()
        .merge(crate::core::router())
        .merge(crate::chat::router())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}

pub async fn run() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    info!("=== Presence Relay Server ===");

    let config = RelayConfig::from_env()?;
    config.ensure_dirs()?;
    info!("Data directory: {:?}", config.root_dir);

    let store = open_store(&config).await?;
    info!("Record store initialized");

    let state = AppState::new(config.clone(), store);
    let app = app(state)?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("WebSocket relay listening on ws://{}/ws", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing();
        init_tracing();
        tracing::info!("still logging");
    }
}
