//! Gateway error types
//!
//! Every REST failure ends up as a [`GatewayError`] that renders itself into a
//! JSON [`ErrorResponse`]; nothing propagates past the request that caused it.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure talking to an upstream service
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Upstream unreachable, connection reset, or body read aborted
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure producing the current stream statistics
#[derive(Debug, Error)]
pub enum PollError {
    /// The statistics endpoint could not be reached
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The statistics body is not a list of stream descriptors
    #[error("failed to decode stream statistics: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors surfaced to REST callers
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Poll(#[from] PollError),

    /// Inbound command/clip body did not match the expected shape
    #[error("invalid request body: {0}")]
    MalformedInput(#[source] serde_json::Error),

    /// Path parameter that would resolve to a different upstream route
    #[error("invalid path parameter {0:?}")]
    InvalidPathParameter(String),

    /// No response was produced within the request bound, usually because an
    /// upstream stalled
    #[error("no response within {}s", .0.as_secs())]
    Timeout(Duration),

    /// Unexpected middleware failure
    #[error("internal error: {0}")]
    Internal(String),

    #[error("stream {0} not found")]
    StreamNotFound(String),

    #[error("origin {0} is not allowed")]
    OriginRejected(String),

    #[error("no route for this method and path")]
    NotFound,
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl GatewayError {
    /// HTTP status the caller sees
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Upstream(_)
            | GatewayError::Poll(_)
            | GatewayError::Timeout(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::MalformedInput(_) | GatewayError::InvalidPathParameter(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::StreamNotFound(_) | GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::OriginRejected(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Upstream(_) => "upstream_unreachable",
            GatewayError::Poll(PollError::Upstream(_)) => "upstream_unreachable",
            GatewayError::Poll(PollError::Decode(_)) => "upstream_decode_failed",
            GatewayError::Timeout(_) => "upstream_timeout",
            GatewayError::Internal(_) => "internal",
            GatewayError::MalformedInput(_) => "malformed_input",
            GatewayError::InvalidPathParameter(_) => "invalid_path_parameter",
            GatewayError::StreamNotFound(_) => "stream_not_found",
            GatewayError::OriginRejected(_) => "origin_rejected",
            GatewayError::NotFound => "not_found",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "Request failed");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.kind().to_string(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}
