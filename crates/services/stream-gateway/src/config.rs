//! Configuration for the Stream Gateway
//!
//! Configuration can be loaded from a TOML file and/or environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Main configuration for the Stream Gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream service locations
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Cross-origin policy
    #[serde(default)]
    pub cors: CorsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP/WebSocket port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound for producing a response to one inbound request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Base URLs of the services the gateway fronts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Device manager base URL
    #[serde(default = "default_device_manager_url")]
    pub device_manager_url: String,

    /// RTMP server base URL (serves `/stat`)
    #[serde(default = "default_streaming_server_url")]
    pub streaming_server_url: String,
}

fn default_device_manager_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_streaming_server_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            device_manager_url: default_device_manager_url(),
            streaming_server_url: default_streaming_server_url(),
        }
    }
}

/// Cross-origin policy for REST responses and WebSocket upgrades.
///
/// The gateway is meant for a trusted local network, so every origin is
/// accepted unless `allow_any_origin` is switched off. With the flag off only
/// origins listed in `allowed_origins` may call the API or open `/ws`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Accept requests from any origin
    #[serde(default = "default_allow_any_origin")]
    pub allow_any_origin: bool,

    /// Origins accepted when `allow_any_origin` is false
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_allow_any_origin() -> bool {
    true
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_any_origin: default_allow_any_origin(),
            allowed_origins: Vec::new(),
        }
    }
}

impl CorsConfig {
    /// Whether a request carrying this `Origin` header may proceed.
    ///
    /// Requests without an `Origin` header (non-browser clients) are always
    /// accepted.
    pub fn permits(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(_) if self.allow_any_origin => true,
            Some(origin) => self
                .allowed_origins
                .iter()
                .any(|allowed| allowed.trim_end_matches('/') == origin.trim_end_matches('/')),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Config::default();

        // Upstreams
        if let Ok(url) = std::env::var("DEVICE_MANAGER_URL") {
            config.upstream.device_manager_url = url;
        }
        if let Ok(url) = std::env::var("RTMP_SERVER_URL") {
            config.upstream.streaming_server_url = url;
        }

        // Server
        if let Ok(host) = std::env::var("GATEWAY_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("GATEWAY_PORT") {
            if let Ok(p) = port.parse() {
                config.server.port = p;
            }
        }
        if let Ok(timeout) = std::env::var("GATEWAY_REQUEST_TIMEOUT") {
            if let Ok(t) = timeout.parse() {
                config.server.request_timeout_seconds = t;
            }
        }

        // CORS
        if let Ok(any) = std::env::var("GATEWAY_ALLOW_ANY_ORIGIN") {
            if let Ok(a) = any.parse() {
                config.cors.allow_any_origin = a;
            }
        }
        if let Ok(origins) = std::env::var("GATEWAY_ALLOWED_ORIGINS") {
            config.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            if p.as_ref().exists() {
                return Self::from_file(p);
            }
        }
        Ok(Self::from_env())
    }

    /// Check that both upstream URLs can serve as a base for forwarded requests
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_base_url(&self.upstream.device_manager_url)?;
        parse_base_url(&self.upstream.streaming_server_url)?;
        Ok(())
    }

    /// `host:port` the gateway listens on
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Parse an upstream base URL, rejecting anything that is not plain http(s)
pub fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUpstream {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUpstream {
            url: raw.to_string(),
            reason: "must be an http:// or https:// URL".to_string(),
        });
    }

    Ok(url)
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid upstream URL {url}: {reason}")]
    InvalidUpstream { url: String, reason: String },
}
