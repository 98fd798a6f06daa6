//! Fixed-interval dispatch of poll cycles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::poller::cycle::Poller;

pub struct Scheduler {
    poller: Arc<Poller>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(poller: Arc<Poller>, interval: Duration) -> Self {
        Self { poller, interval }
    }

    /// Tick every tracked backend on each interval until shutdown.
    ///
    /// Each backend's cycle runs in its own task, so a slow backend never
    /// delays the others.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            backends = self.poller.tracked().len(),
            "Poll scheduler starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.dispatch(),
                _ = shutdown.recv() => {
                    tracing::info!("Poll scheduler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn dispatch(&self) {
        for backend in self.poller.tracked() {
            let poller = self.poller.clone();
            tokio::spawn(async move {
                // failures are logged and published as staleness inside tick
                let _ = poller.tick(&backend).await;
            });
        }
    }
}
