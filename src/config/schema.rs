//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the console.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the console.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Data Plane API connection settings.
    pub dataplane: DataplaneConfig,

    /// Counter exposition feed settings.
    pub metrics_feed: MetricsFeedConfig,

    /// Poll cadence and rate tracking.
    pub poller: PollerConfig,

    /// JSON API exposed to the console front end.
    pub api: ApiConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Data Plane API connection settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataplaneConfig {
    /// Base URL of the Data Plane API (e.g., "http://localhost:5555").
    pub base_url: String,

    /// Basic auth user.
    pub username: String,

    /// Basic auth password.
    pub password: String,

    /// Total request timeout in seconds.
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for DataplaneConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5555".to_string(),
            username: "admin".to_string(),
            password: String::new(),
            timeout_secs: 5,
            connect_timeout_secs: 2,
        }
    }
}

impl std::fmt::Debug for DataplaneConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataplaneConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Prometheus exporter scrape settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsFeedConfig {
    /// Full URL of the exposition endpoint.
    pub url: String,

    /// Scrape timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for MetricsFeedConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8405/metrics".to_string(),
            timeout_secs: 5,
        }
    }
}

/// Polling and rate tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between poll cycles.
    pub interval_secs: u64,

    /// Rolling history capacity per backend and metric.
    pub history_len: usize,

    /// Backends tracked from startup.
    pub backends: Vec<String>,

    /// Counter families converted into per-second rates.
    pub rate_metrics: Vec<String>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            history_len: 30,
            backends: Vec::new(),
            rate_metrics: vec![
                "haproxy_server_sessions_total".to_string(),
                "haproxy_server_bytes_in_total".to_string(),
                "haproxy_server_bytes_out_total".to_string(),
            ],
        }
    }
}

/// Console API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Serve the JSON API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Bind address.
    pub bind_address: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Enable self-metrics endpoint.
    pub metrics_enabled: bool,

    /// Self-metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
