//! Data Plane API resource types and error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by every call against the control plane or the metrics feed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataplaneError {
    /// Network-level failure (DNS, refused connection, timeout). Recoverable on the next cycle.
    #[error("transport error calling {target}: {reason}")]
    Transport { target: String, reason: String },

    /// Non-2xx answer to a read call.
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Configuration version raced with another writer, even after the retry.
    #[error("version conflict during {operation}, retry with fresh state")]
    Conflict { operation: &'static str },

    /// Non-2xx, non-conflict answer to a mutation.
    #[error("{operation} rejected with {status}: {body}")]
    Mutation {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// Malformed metrics exposition payload.
    #[error("metrics parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// A 2xx body that did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),

    /// Rejected before any call was made.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl DataplaneError {
    /// Whether the error is expected to clear on its own by the next poll.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Upstream { .. })
    }
}

/// Result type for Data Plane API operations.
pub type DataplaneResult<T> = Result<T, DataplaneError>;

/// The single version stamp guarding all configuration mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConfigVersion(pub u64);

impl std::fmt::Display for ConfigVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Balance section of a backend definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub algorithm: String,
}

/// Backend definition as submitted to the configuration API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backend {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Balance>,
}

impl Backend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: None,
            balance: None,
        }
    }
}

/// Aggregate backend row from the native stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDetails {
    pub name: String,
    pub algorithm: Option<String>,
    pub mode: Option<String>,
    pub status: Option<String>,
}

/// Health-check toggle as encoded by the configuration API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    Enabled,
    #[default]
    Disabled,
}

impl From<bool> for Toggle {
    fn from(on: bool) -> Self {
        if on {
            Toggle::Enabled
        } else {
            Toggle::Disabled
        }
    }
}

/// Server entry inside a backend's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub check: Toggle,
}

/// Administrative state of a server at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminState {
    Ready,
    Drain,
    Maint,
    #[default]
    #[serde(other)]
    Unknown,
}

impl AdminState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminState::Ready => "ready",
            AdminState::Drain => "drain",
            AdminState::Maint => "maint",
            AdminState::Unknown => "unknown",
        }
    }
}

/// Operational state of a server at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationalState {
    Up,
    Down,
    Stopping,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Per-server runtime state as listed by the runtime API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeServerState {
    pub name: String,
    #[serde(default)]
    pub admin_state: AdminState,
    #[serde(default)]
    pub operational_state: OperationalState,
}

/// Point-in-time counters for one server from the native stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    pub name: String,
    pub current_sessions: u64,
    pub queued_connections: u64,
    pub total_sessions: u64,
}
