//! Counter-metrics feed ingestion.
//!
//! # Data Flow
//! ```text
//! HAProxy Prometheus exporter (text exposition format)
//!     → ingest.rs (ExpositionSource: HTTP scrape with timeout)
//!     → parser.rs (families of labelled samples, all-or-nothing)
//!     → MetricSet::server_counters (one backend, aggregate rows removed)
//!     → rate engine
//! ```

pub mod ingest;
pub mod parser;

pub use ingest::{ExpositionSource, HttpExpositionSource, MetricsIngestor, Scrape};
pub use parser::{parse_exposition, MetricFamily, MetricKind, MetricSet, Sample};
