//! HAProxy Data Plane API integration.
//!
//! # Data Flow
//! ```text
//! ConsoleConfig.dataplane (base URL, Basic-Auth credentials, timeouts)
//!     → client.rs (reqwest transport behind the Transport trait)
//!     → topology.rs (version, servers, backend details: read only)
//!     → runtime.rs (admin/operational state + native stats, joined)
//!     → mutator.rs (version-guarded create/delete/replace, runtime state)
//!     → diagnostics.rs (API info, health, process info)
//! ```
//!
//! # Design Decisions
//! - The transport never interprets status codes; each layer decides what a
//!   non-2xx means for its call
//! - Every layer holds an `Arc<dyn Transport>` so tests script the control plane
//! - Mutations retry a version conflict exactly once, nothing else is retried

pub mod client;
pub mod diagnostics;
pub mod mutator;
pub mod paths;
pub mod runtime;
pub mod topology;
pub mod types;

pub use client::{DataplaneClient, DataplaneRequest, DataplaneResponse, Transport};
pub use diagnostics::{Diagnostics, DiagnosticsReader};
pub use mutator::{MutationReceipt, Mutator};
pub use runtime::{RuntimeFetcher, RuntimeRow, RuntimeSnapshot};
pub use topology::TopologyReader;
pub use types::{
    AdminState, Backend, BackendDetails, ConfigVersion, DataplaneError, DataplaneResult,
    OperationalState, RuntimeServerState, Server, ServerStats,
};
