//! Recording endpoints, forwarded to the device manager as-is

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
};
use bytes::Bytes;

use super::proxy::{forward_get, forward_post, path_param, request_content_type};
use super::AppState;
use crate::error::GatewayError;

/// List recordings
///
/// GET /api/recordings
pub async fn list_recordings(State(state): State<AppState>) -> Result<Response, GatewayError> {
    let url = state.device_manager.endpoint(&["recordings"]);
    forward_get(&state.device_manager, url).await
}

/// Run an operation on one recording
///
/// POST /api/recordings/:id
pub async fn recording_operation(
    State(state): State<AppState>,
    Path(recording_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let recording_id = path_param(recording_id)?;
    tracing::info!(recording_id = %recording_id, "Forwarding recording operation");
    let url = state.device_manager.endpoint(&["recordings", &recording_id]);
    forward_post(&state.device_manager, url, body, request_content_type(&headers)).await
}
