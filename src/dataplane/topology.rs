//! Read-only access to the versioned configuration.

use std::sync::Arc;

use crate::dataplane::client::{DataplaneRequest, Transport};
use crate::dataplane::paths;
use crate::dataplane::runtime::native_stat_entries;
use crate::dataplane::types::{
    BackendDetails, ConfigVersion, DataplaneError, DataplaneResult, Server,
};

/// Reads backends, servers and the configuration version.
#[derive(Clone)]
pub struct TopologyReader {
    transport: Arc<dyn Transport>,
}

impl TopologyReader {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Current configuration version.
    pub async fn config_version(&self) -> DataplaneResult<ConfigVersion> {
        let response = self
            .transport
            .call(DataplaneRequest::get(paths::config_version()))
            .await?
            .ensure_success()?;

        response
            .body
            .trim()
            .parse::<u64>()
            .map(ConfigVersion)
            .map_err(|_| DataplaneError::Decode(format!("invalid version '{}'", response.body.trim())))
    }

    /// Servers configured in a backend.
    pub async fn backend_servers(&self, backend: &str) -> DataplaneResult<Vec<Server>> {
        self.transport
            .call(DataplaneRequest::get(paths::servers(backend)))
            .await?
            .ensure_success()?
            .json()
    }

    /// The full configuration record of one server, every field preserved.
    pub async fn server_record(&self, backend: &str, name: &str) -> DataplaneResult<serde_json::Value> {
        let record: serde_json::Value = self
            .transport
            .call(DataplaneRequest::get(paths::server(backend, name)))
            .await?
            .ensure_success()?
            .json()?;

        if !record.is_object() {
            return Err(DataplaneError::Decode(format!(
                "server record for {}/{} is not an object",
                backend, name
            )));
        }
        Ok(record)
    }

    /// Aggregate algorithm, mode and status of a backend.
    pub async fn backend_details(&self, backend: &str) -> DataplaneResult<BackendDetails> {
        let payload: serde_json::Value = self
            .transport
            .call(DataplaneRequest::get(paths::backend_stats(backend)))
            .await?
            .ensure_success()?
            .json()?;

        let entry = native_stat_entries(&payload).into_iter().next();
        let stats = entry.and_then(|e| e.get("stats"));
        let field = |key: &str| {
            stats
                .and_then(|s| s.get(key))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        Ok(BackendDetails {
            name: entry
                .and_then(|e| e.get("name"))
                .and_then(|v| v.as_str())
                .unwrap_or(backend)
                .to_string(),
            algorithm: field("algo"),
            mode: field("mode"),
            status: field("status"),
        })
    }
}
