//! One poll cycle for one backend.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::config::PollerConfig;
use crate::dataplane::client::Transport;
use crate::dataplane::runtime::RuntimeFetcher;
use crate::dataplane::topology::TopologyReader;
use crate::dataplane::types::DataplaneResult;
use crate::exposition::{ExpositionSource, MetricsIngestor};
use crate::observability::metrics;
use crate::rates::{HistoryPoint, RateHistory, RateTable};
use crate::view::{merge, unix_millis, BackendView, MergeInputs, ViewStore};

/// Per-backend state carried between cycles.
#[derive(Debug)]
struct BackendTrack {
    table: RateTable,
    history: RateHistory,
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(Arc<BackendView>),
    /// A cycle for the same backend was still running.
    Skipped,
    /// The backend is not tracked, or was untracked while the cycle ran.
    NotTracked,
}

/// Drives poll cycles and owns every backend's rate state.
///
/// Cycles for the same backend are serialized by a per-backend lock; a tick
/// that finds the lock held is skipped rather than queued.
pub struct Poller {
    topology: TopologyReader,
    runtime: RuntimeFetcher,
    ingestor: MetricsIngestor,
    store: Arc<ViewStore>,
    tracks: DashMap<String, Arc<Mutex<BackendTrack>>>,
    rate_metrics: Vec<String>,
    history_len: usize,
}

impl Poller {
    pub fn new(
        transport: Arc<dyn Transport>,
        source: Arc<dyn ExpositionSource>,
        store: Arc<ViewStore>,
        config: &PollerConfig,
    ) -> Self {
        let poller = Self {
            topology: TopologyReader::new(transport.clone()),
            runtime: RuntimeFetcher::new(transport),
            ingestor: MetricsIngestor::new(source),
            store,
            tracks: DashMap::new(),
            rate_metrics: config.rate_metrics.clone(),
            history_len: config.history_len,
        };
        for backend in &config.backends {
            poller.track(backend);
        }
        poller
    }

    pub fn store(&self) -> &Arc<ViewStore> {
        &self.store
    }

    pub fn ingestor(&self) -> &MetricsIngestor {
        &self.ingestor
    }

    pub fn rate_metrics(&self) -> &[String] {
        &self.rate_metrics
    }

    /// Start polling a backend. Returns false if it was already tracked.
    pub fn track(&self, backend: &str) -> bool {
        match self.tracks.entry(backend.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(BackendTrack {
                    table: RateTable::new(),
                    history: RateHistory::new(self.history_len),
                })));
                tracing::info!(backend, "Backend tracked");
                true
            }
        }
    }

    /// Stop polling a backend and drop its rate state and view.
    pub fn untrack(&self, backend: &str) -> bool {
        let removed = self.tracks.remove(backend).is_some();
        self.store.remove(backend);
        if removed {
            tracing::info!(backend, "Backend untracked");
        }
        removed
    }

    pub fn is_tracked(&self, backend: &str) -> bool {
        self.tracks.contains_key(backend)
    }

    /// Tracked backend names, sorted.
    pub fn tracked(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tracks.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Rate history of a backend, oldest point first per metric.
    pub async fn history(&self, backend: &str) -> Option<BTreeMap<String, Vec<HistoryPoint>>> {
        let track = self.tracks.get(backend).map(|t| t.value().clone())?;
        let guard = track.lock().await;
        Some(guard.history.snapshot())
    }

    fn registered(&self, backend: &str) -> Option<Arc<Mutex<BackendTrack>>> {
        self.tracks.get(backend).map(|t| t.value().clone())
    }

    /// Whether `track` is still the one registered for `backend`.
    fn is_current(&self, backend: &str, track: &Arc<Mutex<BackendTrack>>) -> bool {
        self.tracks
            .get(backend)
            .is_some_and(|t| Arc::ptr_eq(t.value(), track))
    }

    /// Run one cycle for `backend` and publish its view.
    ///
    /// The server listing and the metrics feed are required; if either fails
    /// the previous view is kept and marked stale, and no baseline moves.
    /// Runtime state, stats and backend details degrade to defaults.
    ///
    /// Untracked backends are never polled, and a cycle whose backend is
    /// untracked before it finishes publishes nothing.
    pub async fn tick(&self, backend: &str) -> DataplaneResult<CycleOutcome> {
        let Some(track) = self.registered(backend) else {
            tracing::debug!(backend, "Tick for untracked backend ignored");
            return Ok(CycleOutcome::NotTracked);
        };
        let Ok(mut guard) = track.try_lock() else {
            tracing::debug!(backend, "Previous cycle still running, skipping tick");
            metrics::record_skipped(backend);
            return Ok(CycleOutcome::Skipped);
        };

        let start = Instant::now();
        let (servers, details, runtime, feed) = tokio::join!(
            self.topology.backend_servers(backend),
            self.topology.backend_details(backend),
            self.runtime.fetch(backend),
            self.ingestor.scrape(),
        );
        let sampled_at = Instant::now();

        let (servers, feed) = match (servers, feed) {
            (Ok(servers), Ok(feed)) => (servers, feed),
            (Err(e), _) | (_, Err(e)) => {
                if !self.is_current(backend, &track) {
                    return Ok(CycleOutcome::NotTracked);
                }
                if e.is_transient() {
                    tracing::warn!(backend, error = %e, "Poll cycle failed, keeping previous view");
                } else {
                    tracing::error!(backend, error = %e, "Poll cycle failed, keeping previous view");
                }
                self.store.mark_stale(backend, &e.to_string(), unix_millis());
                if !self.is_current(backend, &track) {
                    self.store.remove(backend);
                    return Ok(CycleOutcome::NotTracked);
                }
                metrics::record_cycle(backend, "failed", start);
                metrics::record_stale(self.store.stale_count());
                return Err(e);
            }
        };

        let configured: HashSet<&str> = servers.iter().map(|s| s.name.as_str()).collect();
        let samples: Vec<_> = feed
            .server_counters(backend, &self.rate_metrics, sampled_at)
            .into_iter()
            .filter(|s| configured.contains(s.server.as_str()))
            .collect();

        let cycle = guard.table.apply_cycle(&samples);
        if cycle.purged > 0 {
            tracing::debug!(backend, purged = cycle.purged, "Purged baselines of vanished servers");
        }
        metrics::record_purged(backend, cycle.purged);

        let observed_at_ms = unix_millis();
        for metric in &self.rate_metrics {
            guard
                .history
                .record(metric, observed_at_ms, cycle.valid_rates(metric));
        }

        let view = merge(MergeInputs {
            backend,
            servers: &servers,
            details: &details,
            runtime: &runtime,
            rates: &guard.table,
            rate_metrics: &self.rate_metrics,
            observed_at_ms,
        });
        if view.is_degraded() {
            tracing::warn!(backend, degraded = view.degraded.len(), "Published view with degraded sources");
        }

        if !self.is_current(backend, &track) {
            return Ok(CycleOutcome::NotTracked);
        }
        let published = self.store.publish(view);
        // untrack removes the track before the view, so a view published
        // after that removal is withdrawn here
        if !self.is_current(backend, &track) {
            self.store.remove(backend);
            return Ok(CycleOutcome::NotTracked);
        }
        metrics::record_cycle(backend, "ok", start);
        metrics::record_stale(self.store.stale_count());
        tracing::debug!(
            backend,
            servers = published.servers.len(),
            samples = samples.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Poll cycle completed"
        );

        Ok(CycleOutcome::Completed(published))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::client::DataplaneResponse;
    use crate::dataplane::types::{AdminState, DataplaneError};
    use crate::testing::{ScriptedFeed, ScriptedTransport};
    use crate::view::CounterReading;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    const SESSIONS: &str = "haproxy_server_sessions_total";

    fn config() -> PollerConfig {
        PollerConfig {
            backends: vec!["app_be".into()],
            rate_metrics: vec![SESSIONS.into()],
            history_len: 5,
            ..PollerConfig::default()
        }
    }

    /// Control plane whose configured server names can be swapped between polls.
    fn control_plane(names: Arc<StdMutex<Vec<&'static str>>>) -> Arc<ScriptedTransport> {
        ScriptedTransport::new(move |req| {
            let names = names.lock().unwrap().clone();
            let body = if req.path.contains("/runtime/") {
                json!(names
                    .iter()
                    .map(|n| json!({ "name": n, "admin_state": "ready", "operational_state": "up" }))
                    .collect::<Vec<_>>())
            } else if req.path.contains("type=server") {
                json!({ "stats": names
                    .iter()
                    .map(|n| json!({ "name": n, "type": "server", "stats": { "scur": 1, "qcur": 0, "stot": 10 } }))
                    .collect::<Vec<_>>() })
            } else if req.path.contains("type=backend") {
                json!({ "stats": [{ "name": "app_be", "type": "backend", "stats": { "algo": "roundrobin" } }] })
            } else {
                json!(names
                    .iter()
                    .map(|n| json!({ "name": n, "address": "10.0.0.1", "port": 80 }))
                    .collect::<Vec<_>>())
            };
            Ok(DataplaneResponse::new(200, body.to_string()))
        })
    }

    fn feed_text(rows: &[(&str, u64)]) -> String {
        let mut text = format!("# TYPE {} counter\n", SESSIONS);
        for (server, value) in rows {
            text.push_str(&format!("{}{{proxy=\"app_be\",server=\"{}\"}} {}\n", SESSIONS, server, value));
        }
        text.push_str(&format!("{}{{proxy=\"app_be\",server=\"BACKEND\"}} 99999\n", SESSIONS));
        text
    }

    fn completed(outcome: CycleOutcome) -> Arc<BackendView> {
        match outcome {
            CycleOutcome::Completed(view) => view,
            other => panic!("cycle did not complete: {:?}", other),
        }
    }

    async fn baselines(poller: &Poller, backend: &str) -> usize {
        let track = poller.tracks.get(backend).map(|t| t.value().clone()).unwrap();
        let guard = track.lock().await;
        guard.table.len()
    }

    #[tokio::test]
    async fn test_rename_shows_exactly_one_name() {
        let names = Arc::new(StdMutex::new(vec!["web1"]));
        let feed = ScriptedFeed::new(&feed_text(&[("web1", 100)]));
        let poller = Poller::new(control_plane(names.clone()), feed.clone(), Arc::new(ViewStore::new()), &config());

        let first = completed(poller.tick("app_be").await.unwrap());
        assert_eq!(first.servers.len(), 1);
        assert_eq!(first.servers[0].admin_state, AdminState::Ready);

        *names.lock().unwrap() = vec!["web1_new"];
        feed.set(&feed_text(&[("web1_new", 100)]));

        let second = completed(poller.tick("app_be").await.unwrap());
        let shown: Vec<_> = second.servers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(shown, vec!["web1_new"]);
        assert!(!second.servers[0].counters[SESSIONS].fresh);
        assert_eq!(baselines(&poller, "app_be").await, 1);
    }

    #[tokio::test]
    async fn test_removed_server_purged_and_restarts_undefined() {
        let names = Arc::new(StdMutex::new(vec!["web1", "web2"]));
        let feed = ScriptedFeed::new(&feed_text(&[("web1", 100), ("web2", 50)]));
        let poller = Poller::new(control_plane(names.clone()), feed.clone(), Arc::new(ViewStore::new()), &config());

        poller.tick("app_be").await.unwrap();
        assert_eq!(baselines(&poller, "app_be").await, 2);

        *names.lock().unwrap() = vec!["web1"];
        feed.set(&feed_text(&[("web1", 120)]));
        poller.tick("app_be").await.unwrap();
        assert_eq!(baselines(&poller, "app_be").await, 1);

        *names.lock().unwrap() = vec!["web1", "web2"];
        feed.set(&feed_text(&[("web1", 140), ("web2", 9_000)]));
        let view = completed(poller.tick("app_be").await.unwrap());
        let web2 = &view.server("web2").unwrap().counters[SESSIONS];
        assert_eq!(web2.total, 9_000);
        assert_eq!(web2.rate, 0.0);
        assert!(!web2.fresh);
    }

    #[tokio::test]
    async fn test_unconfigured_and_aggregate_rows_not_observed() {
        let names = Arc::new(StdMutex::new(vec!["web1"]));
        let feed = ScriptedFeed::new(&feed_text(&[("web1", 1), ("ghost", 7)]));
        let poller = Poller::new(control_plane(names), feed, Arc::new(ViewStore::new()), &config());

        let view = completed(poller.tick("app_be").await.unwrap());
        assert!(view.server("ghost").is_none());
        assert_eq!(baselines(&poller, "app_be").await, 1);
    }

    #[tokio::test]
    async fn test_feed_failure_keeps_last_view_and_baselines() {
        let names = Arc::new(StdMutex::new(vec!["web1"]));
        let feed = ScriptedFeed::new(&feed_text(&[("web1", 100)]));
        let store = Arc::new(ViewStore::new());
        let poller = Poller::new(control_plane(names), feed.clone(), store.clone(), &config());

        let good = completed(poller.tick("app_be").await.unwrap());

        feed.set("haproxy_server_sessions_total{proxy=\"app_be\" 1\n");
        let err = poller.tick("app_be").await.unwrap_err();
        assert!(matches!(err, DataplaneError::Parse { .. }));

        let published = store.get("app_be").unwrap();
        assert!(published.stale);
        assert_eq!(published.view.unwrap().observed_at_ms, good.observed_at_ms);
        assert!(published.last_error.unwrap().contains("line 1"));
        assert_eq!(baselines(&poller, "app_be").await, 1);
    }

    #[tokio::test]
    async fn test_runtime_failure_degrades_view() {
        let transport = ScriptedTransport::new(|req| {
            if req.path.contains("/runtime/") {
                return Ok(DataplaneResponse::new(503, "runtime api unavailable"));
            }
            let body = if req.path.contains("/stats/") {
                json!({ "stats": [] })
            } else {
                json!([{ "name": "web1", "address": "10.0.0.1" }])
            };
            Ok(DataplaneResponse::new(200, body.to_string()))
        });
        let poller = Poller::new(transport, ScriptedFeed::new(""), Arc::new(ViewStore::new()), &config());

        let view = completed(poller.tick("app_be").await.unwrap());
        assert!(view.is_degraded());
        assert_eq!(view.servers[0].admin_state, AdminState::Unknown);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let names = Arc::new(StdMutex::new(vec!["web1"]));
        let poller = Poller::new(control_plane(names), ScriptedFeed::new(""), Arc::new(ViewStore::new()), &config());

        let track = poller.registered("app_be").unwrap();
        let _held = track.lock().await;
        assert!(matches!(poller.tick("app_be").await.unwrap(), CycleOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_history_records_valid_rates_only() {
        let names = Arc::new(StdMutex::new(vec!["web1"]));
        let feed = ScriptedFeed::new(&feed_text(&[("web1", 100)]));
        let poller = Poller::new(control_plane(names), feed.clone(), Arc::new(ViewStore::new()), &config());

        poller.tick("app_be").await.unwrap();
        assert!(poller.history("app_be").await.unwrap().is_empty());

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        feed.set(&feed_text(&[("web1", 200)]));
        poller.tick("app_be").await.unwrap();

        let history = poller.history("app_be").await.unwrap();
        let points = &history[SESSIONS];
        assert_eq!(points.len(), 1);
        assert!(points[0].rates["web1"] > 0.0);
    }

    #[tokio::test]
    async fn test_series_missing_from_feed_restarts_undefined() {
        let names = Arc::new(StdMutex::new(vec!["web1"]));
        let feed = ScriptedFeed::new(&feed_text(&[("web1", 100)]));
        let poller = Poller::new(control_plane(names), feed.clone(), Arc::new(ViewStore::new()), &config());

        poller.tick("app_be").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        feed.set(&feed_text(&[("web1", 150)]));
        let before = completed(poller.tick("app_be").await.unwrap());
        assert!(before.server("web1").unwrap().counters[SESSIONS].fresh);

        // still configured, but the exporter has no series for it this cycle
        feed.set(&feed_text(&[]));
        let gap = completed(poller.tick("app_be").await.unwrap());
        assert_eq!(gap.servers.len(), 1);
        assert_eq!(gap.server("web1").unwrap().counters[SESSIONS], CounterReading::default());
        assert_eq!(baselines(&poller, "app_be").await, 0);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        feed.set(&feed_text(&[("web1", 50_000)]));
        let back = completed(poller.tick("app_be").await.unwrap());
        let web1 = &back.server("web1").unwrap().counters[SESSIONS];
        assert_eq!(web1.total, 50_000);
        assert!(!web1.fresh);
        assert_eq!(web1.rate, 0.0);
    }

    #[tokio::test]
    async fn test_feed_transport_failure_marks_stale() {
        let names = Arc::new(StdMutex::new(vec!["web1"]));
        let feed = ScriptedFeed::new(&feed_text(&[("web1", 100)]));
        let store = Arc::new(ViewStore::new());
        let poller = Poller::new(control_plane(names), feed.clone(), store.clone(), &config());

        poller.tick("app_be").await.unwrap();
        feed.fail(DataplaneError::Transport {
            target: "http://localhost:8405/metrics".into(),
            reason: "connection failed".into(),
        });

        let err = poller.tick("app_be").await.unwrap_err();
        assert!(err.is_transient());
        let published = store.get("app_be").unwrap();
        assert!(published.stale);
        assert!(published.view.is_some());
    }

    #[tokio::test]
    async fn test_ticks_never_start_tracking() {
        let names = Arc::new(StdMutex::new(vec!["web1"]));
        let store = Arc::new(ViewStore::new());
        let poller = Poller::new(control_plane(names), ScriptedFeed::new(""), store.clone(), &config());

        poller.untrack("app_be");
        for backend in ["app_be", "never_configured"] {
            assert!(matches!(poller.tick(backend).await.unwrap(), CycleOutcome::NotTracked));
        }
        assert!(poller.tracked().is_empty());
        assert!(store.get("app_be").is_none());
        assert!(store.get("never_configured").is_none());
    }

    /// Feed that parks inside `fetch_text` until released.
    struct GatedFeed {
        entered: Notify,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl ExpositionSource for GatedFeed {
        async fn fetch_text(&self) -> DataplaneResult<String> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(feed_text(&[("web1", 1)]))
        }
    }

    #[tokio::test]
    async fn test_untrack_during_cycle_wins() {
        let names = Arc::new(StdMutex::new(vec!["web1"]));
        let feed = Arc::new(GatedFeed {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let store = Arc::new(ViewStore::new());
        let poller = Arc::new(Poller::new(control_plane(names), feed.clone(), store.clone(), &config()));

        let running = {
            let poller = poller.clone();
            tokio::spawn(async move { poller.tick("app_be").await })
        };
        feed.entered.notified().await;

        assert!(poller.untrack("app_be"));
        feed.release.notify_one();

        let outcome = running.await.unwrap().unwrap();
        assert!(matches!(outcome, CycleOutcome::NotTracked));
        assert!(poller.tracked().is_empty());
        assert!(store.get("app_be").is_none());
    }

    #[test]
    fn test_track_and_untrack() {
        let names = Arc::new(StdMutex::new(vec![]));
        let store = Arc::new(ViewStore::new());
        let poller = Poller::new(control_plane(names), ScriptedFeed::new(""), store.clone(), &config());

        assert!(!poller.track("app_be"));
        assert!(poller.track("api_be"));
        assert_eq!(poller.tracked(), vec!["api_be", "app_be"]);

        store.mark_stale("api_be", "unreachable", 1);
        assert!(poller.untrack("api_be"));
        assert!(store.get("api_be").is_none());
        assert!(!poller.is_tracked("api_be"));
    }
}
