//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Poller, mutator, API
//!     → logging.rs (tracing events, EnvFilter from config or RUST_LOG)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape of the console's own metrics listener
//! ```

pub mod logging;
pub mod metrics;
