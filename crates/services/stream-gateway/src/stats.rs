//! RTMP server statistics
//!
//! Polls `<rtmp>/stat` and decodes it into [`StreamDescriptor`]s. Nothing is
//! cached: every call is a fresh round trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PollError;
use crate::upstream::UpstreamClient;

/// One stream as reported by the RTMP server at poll time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Stream key
    pub name: String,

    /// Upstream-defined status ("live", "idle", ...), passed through as-is
    pub status: String,

    /// When the stream went live
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// e.g. "1920x1080"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    /// Bits per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
}

/// Fetches the current stream list from the RTMP server
#[derive(Debug, Clone)]
pub struct StatsPoller {
    client: UpstreamClient,
}

impl StatsPoller {
    pub fn new(client: UpstreamClient) -> Self {
        Self { client }
    }

    /// Poll the statistics endpoint once.
    ///
    /// The body is decoded whatever the status code; an upstream error page
    /// simply fails to decode. Order is preserved and nothing partial is
    /// returned on failure.
    pub async fn poll(&self) -> Result<Vec<StreamDescriptor>, PollError> {
        let response = self.client.get(self.client.endpoint(&["stat"])).await?;
        Ok(decode_stats(&response.body)?)
    }

    /// Poll and pick out a single stream by name
    pub async fn find(&self, name: &str) -> Result<Option<StreamDescriptor>, PollError> {
        Ok(self.poll().await?.into_iter().find(|s| s.name == name))
    }
}

/// Decode a `/stat` body
pub fn decode_stats(body: &[u8]) -> Result<Vec<StreamDescriptor>, serde_json::Error> {
    serde_json::from_slice(body)
}
