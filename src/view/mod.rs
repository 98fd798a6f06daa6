//! Per-backend state views.
//!
//! The merger joins the configuration listing, runtime state, native stats
//! and derived rates into one row per configured server. The store keeps the
//! last successful view per backend and flags it stale when a later cycle
//! fails.

pub mod merge;
pub mod store;

pub use merge::{merge, BackendView, CounterReading, MergeInputs, ServerRow, Source, SourceFailure};
pub use store::{unix_millis, PublishedView, RankedServer, ViewStore};
