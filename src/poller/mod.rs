//! Poll loop.
//!
//! # Data Flow
//! ```text
//! scheduler.rs (interval tick, one task per tracked backend)
//!     → cycle.rs  Poller::tick(backend)
//!         ├── topology: configured servers + backend details
//!         ├── runtime:  admin/operational state + native stats
//!         └── metrics feed scrape
//!     → rate table + history (per-backend, behind one lock)
//!     → view merge → ViewStore::publish  (or mark_stale on failure)
//! ```
//!
//! # Design Decisions
//! - The four fetches of a cycle run concurrently
//! - A tick that finds its backend's previous cycle still running is skipped
//! - Backends are independent; one failing never blocks another

pub mod cycle;
pub mod scheduler;

pub use cycle::{CycleOutcome, Poller};
pub use scheduler::Scheduler;
