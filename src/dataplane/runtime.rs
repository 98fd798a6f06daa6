//! Runtime state and native stats of a backend's servers.
//!
//! # Responsibilities
//! - List admin/operational state per server from the runtime API
//! - Read current/queued/total session counters from native stats
//! - Join the two by server name, zero-filling missing stats
//!
//! The two calls hit independent endpoints and are issued concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::dataplane::client::{DataplaneRequest, Transport};
use crate::dataplane::paths;
use crate::dataplane::types::{
    AdminState, DataplaneResult, OperationalState, RuntimeServerState, ServerStats,
};

/// Aggregate row markers that never name a real server.
pub const AGGREGATE_ROWS: [&str; 2] = ["BACKEND", "FRONTEND"];

/// Runtime state joined with stats for one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeRow {
    pub name: String,
    pub admin_state: AdminState,
    pub operational_state: OperationalState,
    pub current_sessions: u64,
    pub queued_connections: u64,
    pub total_sessions: u64,
}

/// Both halves of a runtime fetch, each with its own outcome.
#[derive(Debug, Clone)]
pub struct RuntimeSnapshot {
    pub states: DataplaneResult<Vec<RuntimeServerState>>,
    pub stats: DataplaneResult<Vec<ServerStats>>,
}

impl RuntimeSnapshot {
    /// Runtime state by server name; empty when the runtime call failed.
    pub fn states_by_name(&self) -> HashMap<&str, &RuntimeServerState> {
        match &self.states {
            Ok(states) => states.iter().map(|s| (s.name.as_str(), s)).collect(),
            Err(_) => HashMap::new(),
        }
    }

    /// Stats by server name; empty when the stats call failed.
    pub fn stats_by_name(&self) -> HashMap<&str, &ServerStats> {
        match &self.stats {
            Ok(stats) => stats.iter().map(|s| (s.name.as_str(), s)).collect(),
            Err(_) => HashMap::new(),
        }
    }

    /// One row per runtime server, stats zero-filled where absent.
    pub fn rows(&self) -> Vec<RuntimeRow> {
        let stats = self.stats_by_name();
        let Ok(states) = &self.states else {
            return Vec::new();
        };

        states
            .iter()
            .map(|state| {
                let s = stats.get(state.name.as_str());
                RuntimeRow {
                    name: state.name.clone(),
                    admin_state: state.admin_state,
                    operational_state: state.operational_state,
                    current_sessions: s.map_or(0, |s| s.current_sessions),
                    queued_connections: s.map_or(0, |s| s.queued_connections),
                    total_sessions: s.map_or(0, |s| s.total_sessions),
                }
            })
            .collect()
    }
}

/// Fetches runtime state and stats for a backend.
#[derive(Clone)]
pub struct RuntimeFetcher {
    transport: Arc<dyn Transport>,
}

impl RuntimeFetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Admin and operational state of every server known to the running process.
    pub async fn runtime_servers(&self, backend: &str) -> DataplaneResult<Vec<RuntimeServerState>> {
        self.transport
            .call(DataplaneRequest::get(paths::runtime_servers(backend)))
            .await?
            .ensure_success()?
            .json()
    }

    /// Session counters per server, aggregate rows excluded.
    pub async fn server_stats(&self, backend: &str) -> DataplaneResult<Vec<ServerStats>> {
        let payload: Value = self
            .transport
            .call(DataplaneRequest::get(paths::server_stats(backend)))
            .await?
            .ensure_success()?
            .json()?;

        let stats = native_stat_entries(&payload)
            .into_iter()
            .filter(|entry| entry.get("type").and_then(Value::as_str) != Some("backend"))
            .filter_map(|entry| {
                let name = entry.get("name").and_then(Value::as_str)?;
                if AGGREGATE_ROWS.contains(&name) {
                    return None;
                }
                let counters = entry.get("stats");
                let counter = |key: &str| counters.and_then(|c| c.get(key)).map_or(0, as_counter);
                Some(ServerStats {
                    name: name.to_string(),
                    current_sessions: counter("scur"),
                    queued_connections: counter("qcur"),
                    total_sessions: counter("stot"),
                })
            })
            .collect();

        Ok(stats)
    }

    /// Fetch runtime state and stats concurrently.
    pub async fn fetch(&self, backend: &str) -> RuntimeSnapshot {
        let (states, stats) = tokio::join!(self.runtime_servers(backend), self.server_stats(backend));
        RuntimeSnapshot { states, stats }
    }

    /// Joined rows, failing if either source failed.
    pub async fn runtime_rows(&self, backend: &str) -> DataplaneResult<Vec<RuntimeRow>> {
        let snapshot = self.fetch(backend).await;
        if let Err(e) = &snapshot.states {
            return Err(e.clone());
        }
        if let Err(e) = &snapshot.stats {
            return Err(e.clone());
        }
        Ok(snapshot.rows())
    }
}

/// Flatten a native stats payload into its `{name, type, stats}` entries.
///
/// Accepts both the object form `{ "stats": [...] }` and the list-of-processes
/// form `[ { "stats": [...] }, ... ]`.
pub(crate) fn native_stat_entries(payload: &Value) -> Vec<&Value> {
    let groups: Vec<&Value> = match payload {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    groups
        .into_iter()
        .filter_map(|group| group.get("stats").and_then(Value::as_array))
        .flatten()
        .collect()
}

fn as_counter(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}
