//! Rate derivation subsystem.
//!
//! # Data Flow
//! ```text
//! Metrics feed scrape (exposition)
//!     → CounterSample per (server, metric)
//!     → engine.rs (RateTable: baseline per key, reset detection, purge)
//!     → history.rs (capped per-metric series of valid rates)
//!     → view merger (latest valid rate per server)
//! ```
//!
//! # Design Decisions
//! - Undefined and Reset are distinct from a confirmed zero rate
//! - Keys missing from a poll are purged at the end of that cycle, so a
//!   re-created server never gets a rate computed across the gap
//! - Tables are plain values handed in by the poller; no global state

pub mod engine;
pub mod history;

pub use engine::{CounterSample, CycleRates, Observation, RateEntry, RateReading, RateTable, SeriesKey};
pub use history::{HistoryPoint, RateHistory};
