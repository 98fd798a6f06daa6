//! Console self-metrics.
//!
//! # Metrics
//! - `console_poll_cycles_total` (counter): cycles by backend and outcome
//! - `console_poll_duration_seconds` (histogram): latency of cycles that ran, by backend
//! - `console_stale_views` (gauge): backends currently serving a stale view
//! - `console_rate_baselines_purged_total` (counter): baselines dropped by backend
//! - `console_mutations_total` (counter): mutations by operation and outcome
//! - `console_version_conflict_retries_total` (counter): retries after a 409

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics recorder"),
    }
}

pub fn record_cycle(backend: &str, outcome: &'static str, start: Instant) {
    ::metrics::counter!(
        "console_poll_cycles_total",
        "backend" => backend.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    ::metrics::histogram!("console_poll_duration_seconds", "backend" => backend.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Count a tick skipped because the previous cycle was still running.
/// Skips never ran, so they add no duration sample.
pub fn record_skipped(backend: &str) {
    ::metrics::counter!(
        "console_poll_cycles_total",
        "backend" => backend.to_string(),
        "outcome" => "skipped"
    )
    .increment(1);
}

pub fn record_purged(backend: &str, count: usize) {
    if count == 0 {
        return;
    }
    ::metrics::counter!("console_rate_baselines_purged_total", "backend" => backend.to_string())
        .increment(count as u64);
}

pub fn record_stale(count: usize) {
    ::metrics::gauge!("console_stale_views").set(count as f64);
}

pub fn record_mutation(operation: &'static str, outcome: &'static str) {
    ::metrics::counter!("console_mutations_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
}

pub fn record_conflict_retry(operation: &'static str) {
    ::metrics::counter!("console_version_conflict_retries_total", "operation" => operation)
        .increment(1);
}
