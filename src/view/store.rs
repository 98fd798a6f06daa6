//! Last published view per backend.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;

use crate::view::merge::BackendView;

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Published state of one backend.
///
/// `view` is the last successful merge; a failed cycle leaves it in place
/// and sets `stale` with the error that caused it.
#[derive(Debug, Clone)]
pub struct PublishedView {
    pub view: Option<Arc<BackendView>>,
    pub stale: bool,
    pub last_error: Option<String>,
    pub last_success_ms: Option<u64>,
    pub last_attempt_ms: u64,
}

/// One server's position in a cross-backend rate ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedServer {
    pub backend: String,
    pub server: String,
    pub rate: f64,
    pub total: u64,
}

#[derive(Debug, Default)]
pub struct ViewStore {
    views: DashMap<String, PublishedView>,
}

impl ViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the backend's view with a fresh one.
    pub fn publish(&self, view: BackendView) -> Arc<BackendView> {
        let at = view.observed_at_ms;
        let view = Arc::new(view);
        self.views.insert(
            view.backend.clone(),
            PublishedView {
                view: Some(view.clone()),
                stale: false,
                last_error: None,
                last_success_ms: Some(at),
                last_attempt_ms: at,
            },
        );
        view
    }

    /// Record a failed cycle. The previous view, if any, stays readable.
    pub fn mark_stale(&self, backend: &str, error: &str, at_ms: u64) {
        let mut entry = self
            .views
            .entry(backend.to_string())
            .or_insert_with(|| PublishedView {
                view: None,
                stale: true,
                last_error: None,
                last_success_ms: None,
                last_attempt_ms: at_ms,
            });
        entry.stale = true;
        entry.last_error = Some(error.to_string());
        entry.last_attempt_ms = at_ms;
    }

    pub fn get(&self, backend: &str) -> Option<PublishedView> {
        self.views.get(backend).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, backend: &str) -> Option<PublishedView> {
        self.views.remove(backend).map(|(_, published)| published)
    }

    /// The `limit` servers with the highest current rate of `metric`
    /// across every backend. Stale views and rows without a valid rate
    /// this cycle are left out.
    pub fn top_servers(&self, metric: &str, limit: usize) -> Vec<RankedServer> {
        let mut ranked: Vec<RankedServer> = self
            .views
            .iter()
            .filter(|entry| !entry.stale)
            .filter_map(|entry| entry.view.clone())
            .flat_map(|view| {
                view.servers
                    .iter()
                    .filter_map(|row| {
                        let reading = row.counters.get(metric).filter(|r| r.fresh)?;
                        Some(RankedServer {
                            backend: view.backend.clone(),
                            server: row.name.clone(),
                            rate: reading.rate,
                            total: reading.total,
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.rate
                .total_cmp(&a.rate)
                .then_with(|| a.backend.cmp(&b.backend))
                .then_with(|| a.server.cmp(&b.server))
        });
        ranked.truncate(limit);
        ranked
    }

    pub fn stale_count(&self) -> usize {
        self.views.iter().filter(|e| e.stale).count()
    }
}
