//! HAProxy operations console.
//!
//! Polls HAProxy's Data Plane API and its Prometheus exporter, derives
//! per-server rates from monotonic counters, and serves a merged per-backend
//! view. Configuration changes go through a version-guarded mutator.
//!
//! # Architecture Overview
//!
//! ```text
//!   Data Plane API (v3)             Prometheus exporter
//!        │        ▲                         │
//!        ▼        │                         ▼
//!  ┌───────────┐ ┌─────────┐         ┌────────────┐
//!  │ topology  │ │ mutator │         │ exposition │
//!  │ runtime   │ └────▲────┘         └─────┬──────┘
//!  └─────┬─────┘      │                    │
//!        │            │              ┌─────▼──────┐
//!        │            │              │   rates    │
//!        │            │              └─────┬──────┘
//!        └──────────► poller ◄─────────────┘
//!                     │   │
//!                     ▼   │
//!                   view ─┴──► api (axum, bearer key)
//! ```

// Control plane and feeds
pub mod config;
pub mod dataplane;
pub mod exposition;

// Derived state
pub mod poller;
pub mod rates;
pub mod view;

// Surfaces and cross-cutting concerns
pub mod api;
pub mod lifecycle;
pub mod observability;

#[cfg(test)]
mod testing;

pub use config::ConsoleConfig;
pub use dataplane::{DataplaneClient, DataplaneError, DataplaneResult, Mutator};
pub use lifecycle::Shutdown;
pub use poller::{Poller, Scheduler};
pub use view::{BackendView, ViewStore};
