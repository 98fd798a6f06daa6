//! Optimistic-concurrency mutations of backends and servers.
//!
//! # Protocol
//! ```text
//! read version v
//!     → submit mutation with ?version=v
//!     → 2xx: done
//!     → 409 version mismatch: read fresh version, submit once more
//!         → 2xx: done
//!         → 409 again: Conflict (caller must re-decide)
//!     → any other status: Mutation{operation, status, body}, no retry
//! ```
//!
//! Runtime admin-state changes act on the running process directly and skip
//! versioning entirely.

use std::sync::Arc;

use serde::Serialize;

use crate::dataplane::client::{DataplaneRequest, DataplaneResponse, Transport};
use crate::dataplane::paths;
use crate::dataplane::topology::TopologyReader;
use crate::dataplane::types::{
    AdminState, Backend, ConfigVersion, DataplaneError, DataplaneResult, Server,
};
use crate::observability::metrics;

/// Submissions per versioned mutation: the first attempt plus one retry.
const MAX_ATTEMPTS: u32 = 2;

/// Result of an accepted mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationReceipt {
    pub operation: &'static str,
    /// Version the accepted submission carried.
    pub version: Option<ConfigVersion>,
    pub attempts: u32,
    /// Body returned by the control plane, `null` when empty or not JSON.
    pub data: serde_json::Value,
}

/// Applies configuration and runtime changes.
#[derive(Clone)]
pub struct Mutator {
    transport: Arc<dyn Transport>,
    topology: TopologyReader,
}

impl Mutator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let topology = TopologyReader::new(transport.clone());
        Self { transport, topology }
    }

    pub async fn create_backend(&self, backend: &Backend) -> DataplaneResult<MutationReceipt> {
        let body = to_body(backend)?;
        self.versioned("create_backend", |v| {
            DataplaneRequest::post(paths::backends(v), body.clone())
        })
        .await
    }

    pub async fn delete_backend(&self, name: &str) -> DataplaneResult<MutationReceipt> {
        self.versioned("delete_backend", |v| DataplaneRequest::delete(paths::backend(name, v)))
            .await
    }

    pub async fn create_server(&self, backend: &str, server: &Server) -> DataplaneResult<MutationReceipt> {
        let body = to_body(server)?;
        self.versioned("create_server", |v| {
            DataplaneRequest::post(paths::servers_versioned(backend, v), body.clone())
        })
        .await
    }

    pub async fn delete_server(&self, backend: &str, name: &str) -> DataplaneResult<MutationReceipt> {
        self.versioned("delete_server", |v| {
            DataplaneRequest::delete(paths::server_versioned(backend, name, v))
        })
        .await
    }

    /// Replace the server currently named `name` with `server`.
    pub async fn replace_server(
        &self,
        backend: &str,
        name: &str,
        server: &Server,
    ) -> DataplaneResult<MutationReceipt> {
        let body = to_body(server)?;
        self.versioned("replace_server", |v| {
            DataplaneRequest::put(paths::server_versioned(backend, name, v), body.clone())
        })
        .await
    }

    /// Rename a server in one atomic replace against its old name.
    ///
    /// The existing record is copied field by field so settings this crate does
    /// not model (weights, check intervals, ...) survive the rename. Every
    /// attempt re-reads the record after the version, so a retry never writes
    /// back a copy older than the version it carries.
    pub async fn rename_server(
        &self,
        backend: &str,
        old_name: &str,
        new_name: &str,
    ) -> DataplaneResult<MutationReceipt> {
        const OPERATION: &str = "rename_server";

        if new_name.trim().is_empty() {
            return Err(DataplaneError::Invalid("new server name must be non-empty".into()));
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            let version = self.topology.config_version().await?;
            let mut record = self.topology.server_record(backend, old_name).await?;
            if let Some(fields) = record.as_object_mut() {
                fields.insert("name".to_string(), serde_json::Value::String(new_name.to_string()));
            }

            let request = DataplaneRequest::put(paths::server_versioned(backend, old_name, version), record);
            let response = self.transport.call(request).await?;
            if let Attempt::Applied(receipt) = settle(OPERATION, version, attempts, response)? {
                return Ok(receipt);
            }
        }
    }

    /// Change a server's admin state on the running process. Idempotent.
    pub async fn set_server_runtime_state(
        &self,
        backend: &str,
        server: &str,
        state: AdminState,
    ) -> DataplaneResult<MutationReceipt> {
        const OPERATION: &str = "set_server_runtime_state";

        if state == AdminState::Unknown {
            return Err(DataplaneError::Invalid(
                "admin state must be one of ready, drain, maint".into(),
            ));
        }

        let request = DataplaneRequest::put(
            paths::runtime_server(backend, server),
            serde_json::json!({ "admin_state": state.as_str() }),
        );
        let response = self.transport.call(request).await?;
        if !response.is_success() {
            metrics::record_mutation(OPERATION, "rejected");
            return Err(DataplaneError::Mutation {
                operation: OPERATION,
                status: response.status,
                body: response.body,
            });
        }

        tracing::info!(backend, server, admin_state = state.as_str(), "Runtime admin state applied");
        metrics::record_mutation(OPERATION, "ok");
        Ok(MutationReceipt {
            operation: OPERATION,
            version: None,
            attempts: 1,
            data: response_data(&response),
        })
    }

    async fn versioned<F>(&self, operation: &'static str, build: F) -> DataplaneResult<MutationReceipt>
    where
        F: Fn(ConfigVersion) -> DataplaneRequest + Send + Sync,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let version = self.topology.config_version().await?;
            let response = self.transport.call(build(version)).await?;
            if let Attempt::Applied(receipt) = settle(operation, version, attempts, response)? {
                return Ok(receipt);
            }
        }
    }
}

/// Outcome of one versioned submission that did not fail outright.
enum Attempt {
    Applied(MutationReceipt),
    Retry,
}

/// Classify a versioned submission: applied, worth one more attempt, or an error.
fn settle(
    operation: &'static str,
    version: ConfigVersion,
    attempts: u32,
    response: DataplaneResponse,
) -> DataplaneResult<Attempt> {
    if response.is_success() {
        tracing::info!(operation, %version, attempts, "Configuration mutation applied");
        metrics::record_mutation(operation, "ok");
        return Ok(Attempt::Applied(MutationReceipt {
            operation,
            version: Some(version),
            attempts,
            data: response_data(&response),
        }));
    }

    if is_version_conflict(&response) {
        if attempts < MAX_ATTEMPTS {
            tracing::warn!(operation, %version, "Configuration version conflict, retrying with fresh version");
            metrics::record_conflict_retry(operation);
            return Ok(Attempt::Retry);
        }
        tracing::warn!(operation, %version, attempts, "Configuration version conflict persisted");
        metrics::record_mutation(operation, "conflict");
        return Err(DataplaneError::Conflict { operation });
    }

    metrics::record_mutation(operation, "rejected");
    Err(DataplaneError::Mutation {
        operation,
        status: response.status,
        body: response.body,
    })
}

/// A 409 means a stale version unless the control plane says the object already exists.
fn is_version_conflict(response: &DataplaneResponse) -> bool {
    response.status == 409 && !response.body.to_ascii_lowercase().contains("already exists")
}

fn to_body<T: Serialize>(value: &T) -> DataplaneResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| DataplaneError::Invalid(e.to_string()))
}

fn response_data(response: &DataplaneResponse) -> serde_json::Value {
    serde_json::from_str(&response.body).unwrap_or(serde_json::Value::Null)
}
