//! Joins configuration, runtime state and rates into one row per server.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dataplane::runtime::RuntimeSnapshot;
use crate::dataplane::types::{
    AdminState, BackendDetails, DataplaneResult, OperationalState, Server, Toggle,
};
use crate::rates::RateTable;

/// Absolute value and latest valid rate of one counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CounterReading {
    pub total: u64,
    /// Latest valid per-second rate, zero until one exists.
    pub rate: f64,
    /// Whether `rate` was produced by the most recent poll.
    pub fresh: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerRow {
    pub name: String,
    pub address: String,
    pub port: Option<u16>,
    pub check: Toggle,
    pub admin_state: AdminState,
    pub operational_state: OperationalState,
    pub current_sessions: u64,
    pub queued_connections: u64,
    pub total_sessions: u64,
    pub counters: BTreeMap<String, CounterReading>,
}

/// Read-path source that can fail without sinking the whole cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Details,
    Runtime,
    Stats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFailure {
    pub source: Source,
    pub error: String,
}

/// Denormalized view of one backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendView {
    pub backend: String,
    pub details: Option<BackendDetails>,
    pub servers: Vec<ServerRow>,
    pub observed_at_ms: u64,
    /// Sources that failed this cycle and were filled with defaults.
    pub degraded: Vec<SourceFailure>,
}

impl BackendView {
    pub fn server(&self, name: &str) -> Option<&ServerRow> {
        self.servers.iter().find(|s| s.name == name)
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Everything one cycle gathered for a backend.
pub struct MergeInputs<'a> {
    pub backend: &'a str,
    pub servers: &'a [Server],
    pub details: &'a DataplaneResult<BackendDetails>,
    pub runtime: &'a RuntimeSnapshot,
    pub rates: &'a RateTable,
    pub rate_metrics: &'a [String],
    pub observed_at_ms: u64,
}

/// Build the view. Every configured server gets a row, whatever the other
/// sources say; runtime-only or metrics-only servers get none.
pub fn merge(inputs: MergeInputs<'_>) -> BackendView {
    let states = inputs.runtime.states_by_name();
    let stats = inputs.runtime.stats_by_name();

    let servers = inputs
        .servers
        .iter()
        .map(|server| {
            let state = states.get(server.name.as_str());
            let stat = stats.get(server.name.as_str());

            let counters = inputs
                .rate_metrics
                .iter()
                .map(|metric| {
                    let reading = inputs
                        .rates
                        .get(&server.name, metric)
                        .map(|entry| CounterReading {
                            total: entry.baseline,
                            rate: entry.last_valid.unwrap_or(0.0),
                            fresh: entry.reading.is_valid(),
                        })
                        .unwrap_or_default();
                    (metric.clone(), reading)
                })
                .collect();

            ServerRow {
                name: server.name.clone(),
                address: server.address.clone(),
                port: server.port,
                check: server.check,
                admin_state: state.map_or(AdminState::Unknown, |s| s.admin_state),
                operational_state: state.map_or(OperationalState::Unknown, |s| s.operational_state),
                current_sessions: stat.map_or(0, |s| s.current_sessions),
                queued_connections: stat.map_or(0, |s| s.queued_connections),
                total_sessions: stat.map_or(0, |s| s.total_sessions),
                counters,
            }
        })
        .collect();

    let mut degraded = Vec::new();
    if let Err(e) = inputs.details {
        degraded.push(SourceFailure {
            source: Source::Details,
            error: e.to_string(),
        });
    }
    if let Err(e) = &inputs.runtime.states {
        degraded.push(SourceFailure {
            source: Source::Runtime,
            error: e.to_string(),
        });
    }
    if let Err(e) = &inputs.runtime.stats {
        degraded.push(SourceFailure {
            source: Source::Stats,
            error: e.to_string(),
        });
    }

    BackendView {
        backend: inputs.backend.to_string(),
        details: inputs.details.as_ref().ok().cloned(),
        servers,
        observed_at_ms: inputs.observed_at_ms,
        degraded,
    }
}
