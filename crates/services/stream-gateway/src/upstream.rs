//! Thin HTTP callers for the device manager and the RTMP server
//!
//! Each call issues exactly one request, buffers the whole response body and
//! hands back the raw status, content type and bytes. No retries, and no
//! client-side timeout beyond what the transport applies on its own.

use axum::http::StatusCode;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use url::Url;

use crate::config::{parse_base_url, ConfigError};
use crate::error::UpstreamError;

/// Raw upstream reply
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// HTTP caller rooted at one upstream base URL
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    base: Url,
    http: Client,
}

impl UpstreamClient {
    /// Create a client for `base_url`, sharing the given connection pool
    pub fn new(base_url: &str, http: Client) -> Result<Self, ConfigError> {
        Ok(Self {
            base: parse_base_url(base_url)?,
            http,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Build `<base>/<segment>/<segment>...`.
    ///
    /// Segments are percent-encoded, so a path parameter like `a/b` stays a
    /// single segment and cannot walk out of the route's template. Dot
    /// segments (`.`, `..`) are folded away by normalization and must be
    /// rejected before they get here.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Base URLs are validated as http(s) at construction, which always
        // have a path to extend.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET `url`
    pub async fn get(&self, url: Url) -> Result<UpstreamResponse, UpstreamError> {
        tracing::debug!(url = %url, "Upstream GET");
        let request = self.http.get(url.clone());
        Self::execute(url, request).await
    }

    /// POST `body` to `url` unchanged
    pub async fn post(
        &self,
        url: Url,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        tracing::debug!(url = %url, body_len = body.len(), "Upstream POST");
        let mut request = self.http.post(url.clone()).body(body);
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        Self::execute(url, request).await
    }

    async fn execute(
        url: Url,
        request: reqwest::RequestBuilder,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let transport = |source| UpstreamError::Transport {
            url: url.to_string(),
            source,
        };

        let response = request.send().await.map_err(transport)?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(transport)?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}
