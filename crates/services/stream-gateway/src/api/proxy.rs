//! Request forwarding
//!
//! Issues the upstream equivalent of an inbound request and relays status and
//! body back byte-for-byte. A transport failure becomes a 500 carrying the
//! underlying cause; upstream error statuses are relayed like any other.

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::GatewayError;
use crate::upstream::{UpstreamClient, UpstreamResponse};

const APPLICATION_JSON: &str = "application/json";

/// Forward a GET and relay the result as JSON
pub async fn forward_get(client: &UpstreamClient, url: Url) -> Result<Response, GatewayError> {
    let upstream = client.get(url).await?;
    Ok(relay(upstream, Some(HeaderValue::from_static(APPLICATION_JSON))))
}

/// Forward a POST with the inbound body untouched.
///
/// `content_type` is what the upstream request declares; the upstream's own
/// content type, if any, is passed back to the caller.
pub async fn forward_post(
    client: &UpstreamClient,
    url: Url,
    body: Bytes,
    content_type: Option<&str>,
) -> Result<Response, GatewayError> {
    let upstream = client.post(url, body, content_type).await?;
    let passthrough = upstream
        .content_type
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok());
    Ok(relay(upstream, passthrough))
}

/// Check a buffered JSON body against `T` without consuming it.
///
/// The decoded value is only used for validation; callers forward the
/// original bytes.
pub fn validate_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, GatewayError> {
    serde_json::from_slice(body).map_err(GatewayError::MalformedInput)
}

/// Reject a path parameter that cannot stand as one upstream path segment.
///
/// `.` and `..` are dot segments: URL normalization folds them into the
/// surrounding path, so the call would land on a different upstream route.
pub fn path_param(value: String) -> Result<String, GatewayError> {
    match value.as_str() {
        "" | "." | ".." => Err(GatewayError::InvalidPathParameter(value)),
        _ => Ok(value),
    }
}

/// `Content-Type` of an inbound request, if it is readable
pub fn request_content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

fn relay(upstream: UpstreamResponse, content_type: Option<HeaderValue>) -> Response {
    let mut response = (upstream.status, Body::from(upstream.body)).into_response();
    if let Some(content_type) = content_type {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}
