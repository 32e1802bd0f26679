//! MCP gateway server implementation
//!
//! Boots the monitor link, builds the axum router for both front ends,
//! and serves until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use beaconconf::HeraldConfig;

use crate::link::{LinkConfig, MonitorLink};
use crate::mcp::{handle_health, handle_mcp, AppState};
use crate::sse::{message_handler, sse_handler};

/// Server configuration
pub struct ServeConfig {
    pub http_port: u16,
    pub link: LinkConfig,
    pub source: String,
    pub default_user: String,
}

impl ServeConfig {
    pub fn from_config(config: &HeraldConfig) -> Self {
        Self {
            http_port: config.bind.http_port,
            link: LinkConfig::new(&config.monitor, &config.identity.source),
            source: config.identity.source.clone(),
            default_user: config.identity.default_user.clone(),
        }
    }
}

/// Run the MCP gateway server
pub async fn run(config: ServeConfig) -> Result<()> {
    info!("Herald MCP gateway starting");
    info!("   Port: {}", config.http_port);
    info!("   Monitor: {}", config.link.endpoint);

    // The link connects in the background; the HTTP surface comes up
    // regardless, answering BackendUnavailable until the link is ready.
    let link = MonitorLink::new(config.link);
    link.connect().await;

    let state = AppState {
        link: link.clone(),
        source: config.source,
        default_user: config.default_user,
        start_time: Instant::now(),
    };

    let app = Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/sse", get(sse_handler))
        .route("/message", post(message_handler))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Herald ready!");
    info!("   MCP (Streamable): POST http://{}/mcp", addr);
    info!("   MCP (SSE): GET http://{}/sse + POST http://{}/message", addr, addr);
    info!("   Health: GET http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    link.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => { sigterm.recv().await; }
                    Err(_) => std::future::pending::<()>().await,
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
