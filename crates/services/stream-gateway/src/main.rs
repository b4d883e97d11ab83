//! Stream Gateway Binary
//!
//! Entry point for the HTTP/WebSocket gateway.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: listen on 0.0.0.0:8000
//! DEVICE_MANAGER_URL=http://device-manager:5000 \
//! RTMP_SERVER_URL=http://rtmp-server:8080 \
//!     cargo run -p stream-gateway
//!
//! # From a config file
//! cargo run -p stream-gateway -- --config gateway.toml
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stream_gateway::{
    api::{build_router, AppState},
    config::Config,
};

#[derive(Parser, Debug)]
#[command(name = "stream-gateway")]
#[command(about = "Unified REST/WebSocket front for the device manager and RTMP server")]
struct Args {
    /// TOML config file (environment variables are used when absent)
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_ref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;
    let config = Arc::new(config);

    tracing::info!(
        device_manager = %config.upstream.device_manager_url,
        streaming_server = %config.upstream.streaming_server_url,
        allow_any_origin = config.cors.allow_any_origin,
        "Starting Stream Gateway"
    );

    // Shared upstream connection pool; no client-side timeout
    let http = reqwest::Client::builder()
        .user_agent(concat!("stream-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")?;

    let shutdown = CancellationToken::new();
    let state = AppState::new(config.clone(), http, shutdown.clone())?;
    let router = build_router(state);

    let bind_addr = config.bind_address();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("HTTP server listening on {}", bind_addr);

    // Run the HTTP server with graceful shutdown on SIGTERM/SIGINT
    let server_shutdown = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, closing broadcast sessions...");
            server_shutdown.cancel();
        })
        .await?;

    tracing::info!("Stream Gateway shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
