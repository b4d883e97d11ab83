//! Device endpoints, forwarded to the device manager as-is

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
};
use bytes::Bytes;

use super::proxy::{forward_get, forward_post, path_param, request_content_type};
use super::AppState;
use crate::error::GatewayError;

/// List devices
///
/// GET /api/devices
pub async fn list_devices(State(state): State<AppState>) -> Result<Response, GatewayError> {
    let url = state.device_manager.endpoint(&["devices"]);
    forward_get(&state.device_manager, url).await
}

/// Ask the device manager to reconnect a device
///
/// POST /api/devices/:id/reconnect
pub async fn reconnect_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let device_id = path_param(device_id)?;
    tracing::info!(device_id = %device_id, "Forwarding device reconnect");
    let url = state
        .device_manager
        .endpoint(&["devices", &device_id, "reconnect"]);
    forward_post(&state.device_manager, url, body, request_content_type(&headers)).await
}
