//! HTTP API for the Stream Gateway
//!
//! - `GET /api/streams` - Current stream list from the RTMP server
//! - `GET /api/streams/:name` - One stream from the current list
//! - `POST /api/streams/:name` - Stream control command (start/stop/restart)
//! - `POST /api/streams/:name/clip` - Clip request
//! - `GET /api/devices` - Device list
//! - `POST /api/devices/:id/reconnect` - Device reconnect
//! - `GET /api/recordings` - Recording list
//! - `POST /api/recordings/:id` - Recording operation
//! - `GET /ws` - Live stream list, pushed every second
//! - `GET /health` - Liveness

pub mod devices;
pub mod proxy;
pub mod recordings;
pub mod streams;

use axum::{
    error_handling::HandleErrorLayer,
    http::{HeaderValue, Method},
    routing::{get, post},
    BoxError, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{timeout::error::Elapsed, timeout::TimeoutLayer, ServiceBuilder};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::broadcast;
use crate::config::{Config, ConfigError, CorsConfig};
use crate::error::GatewayError;
use crate::stats::StatsPoller;
use crate::upstream::UpstreamClient;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Service configuration
    pub config: Arc<Config>,
    /// Device manager caller
    pub device_manager: UpstreamClient,
    /// RTMP statistics poller
    pub poller: StatsPoller,
    /// Cancelled on process shutdown; broadcast sessions derive from it
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create a new AppState with both upstream clients sharing one pool
    pub fn new(
        config: Arc<Config>,
        http: reqwest::Client,
        shutdown: CancellationToken,
    ) -> Result<Self, ConfigError> {
        let device_manager = UpstreamClient::new(&config.upstream.device_manager_url, http.clone())?;
        let streaming_server = UpstreamClient::new(&config.upstream.streaming_server_url, http)?;

        Ok(Self {
            config,
            device_manager,
            poller: StatsPoller::new(streaming_server),
            shutdown,
        })
    }
}

/// Build the HTTP API router
///
/// Anything not listed here, including a known path with the wrong method,
/// gets a 404. A request that has not produced a response within
/// `request_timeout_seconds` is answered with a 500 `upstream_timeout`.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors);
    let timeout = Duration::from_secs(state.config.server.request_timeout_seconds);

    Router::new()
        // Streams
        .route(
            "/api/streams",
            get(streams::list_streams).fallback(not_found),
        )
        .route(
            "/api/streams/:name",
            get(streams::get_stream)
                .post(streams::control_stream)
                .fallback(not_found),
        )
        .route(
            "/api/streams/:name/clip",
            post(streams::create_clip).fallback(not_found),
        )
        // Devices
        .route(
            "/api/devices",
            get(devices::list_devices).fallback(not_found),
        )
        .route(
            "/api/devices/:id/reconnect",
            post(devices::reconnect_device).fallback(not_found),
        )
        // Recordings
        .route(
            "/api/recordings",
            get(recordings::list_recordings).fallback(not_found),
        )
        .route(
            "/api/recordings/:id",
            post(recordings::recording_operation).fallback(not_found),
        )
        // Live updates
        .route("/ws", get(broadcast::ws_handler).fallback(not_found))
        // Health
        .route("/health", get(health_check).fallback(not_found))
        .fallback(not_found)
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(move |err: BoxError| async move {
                    timeout_error(err, timeout)
                }))
                .layer(TimeoutLayer::new(timeout)),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS layer for the configured origin policy
fn cors_layer(policy: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if policy.allow_any_origin {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = policy
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o.trim_end_matches('/')).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

fn timeout_error(err: BoxError, timeout: Duration) -> GatewayError {
    if err.is::<Elapsed>() {
        GatewayError::Timeout(timeout)
    } else {
        GatewayError::Internal(err.to_string())
    }
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

async fn not_found() -> GatewayError {
    GatewayError::NotFound
}
