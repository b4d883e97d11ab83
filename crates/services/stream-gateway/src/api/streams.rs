//! Stream endpoints
//!
//! Listing reads the RTMP server's statistics; control and clip requests are
//! validated locally and then forwarded to the device manager.

use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::proxy::{forward_post, path_param, validate_json};
use super::AppState;
use crate::error::GatewayError;
use crate::stats::StreamDescriptor;

/// Control command body for `POST /api/streams/:name`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamCommand {
    pub command: CommandKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Start,
    Stop,
    Restart,
}

/// Clip body for `POST /api/streams/:name/clip`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipRequest {
    /// Clip length in seconds. Negative lengths are rejected as malformed.
    pub duration: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// List current streams
///
/// GET /api/streams
pub async fn list_streams(
    State(state): State<AppState>,
) -> Result<Json<Vec<StreamDescriptor>>, GatewayError> {
    Ok(Json(state.poller.poll().await?))
}

/// Look up one stream in the current list
///
/// GET /api/streams/:name
pub async fn get_stream(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StreamDescriptor>, GatewayError> {
    state
        .poller
        .find(&name)
        .await?
        .map(Json)
        .ok_or(GatewayError::StreamNotFound(name))
}

/// Forward a control command to the device manager
///
/// POST /api/streams/:name
pub async fn control_stream(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let name = path_param(name)?;
    let command: StreamCommand = validate_json(&body)?;
    tracing::info!(stream = %name, command = ?command.command, "Forwarding stream command");

    let url = state.device_manager.endpoint(&["control", &name]);
    forward_post(&state.device_manager, url, body, Some("application/json")).await
}

/// Forward a clip request to the device manager
///
/// POST /api/streams/:name/clip
pub async fn create_clip(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let name = path_param(name)?;
    let clip: ClipRequest = validate_json(&body)?;
    tracing::info!(
        stream = %name,
        duration = clip.duration,
        title = ?clip.title,
        "Forwarding clip request"
    );

    let url = state.device_manager.endpoint(&["clip", &name]);
    forward_post(&state.device_manager, url, body, Some("application/json")).await
}
