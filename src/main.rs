//! dataplane-console daemon.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use dataplane_console::api::{self, ApiState};
use dataplane_console::config::load_config;
use dataplane_console::dataplane::{DataplaneClient, Transport};
use dataplane_console::exposition::{ExpositionSource, HttpExpositionSource};
use dataplane_console::lifecycle::{spawn_signal_listener, Shutdown};
use dataplane_console::observability::{logging, metrics};
use dataplane_console::{Poller, Scheduler, ViewStore};

#[derive(Parser)]
#[command(name = "dataplane-console", version, about = "HAProxy Data Plane API console")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dataplane-console starting");
    tracing::info!(
        dataplane = %config.dataplane.base_url,
        metrics_feed = %config.metrics_feed.url,
        interval_secs = config.poller.interval_secs,
        backends = config.poller.backends.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let transport: Arc<dyn Transport> = Arc::new(DataplaneClient::new(&config.dataplane)?);
    let feed: Arc<dyn ExpositionSource> = Arc::new(HttpExpositionSource::new(&config.metrics_feed)?);
    let store = Arc::new(ViewStore::new());
    let poller = Arc::new(Poller::new(transport.clone(), feed, store, &config.poller));

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    let scheduler = Scheduler::new(poller.clone(), Duration::from_secs(config.poller.interval_secs));
    let scheduler_task = tokio::spawn(scheduler.run(shutdown.subscribe()));

    if config.api.enabled {
        let listener = TcpListener::bind(&config.api.bind_address).await?;
        let state = ApiState::new(transport, poller, &config.api.api_key);
        let app = api::router(state, Duration::from_secs(config.api.request_timeout_secs));
        api::serve(listener, app, &shutdown).await?;
    } else {
        tracing::info!("Console API disabled");
        shutdown.wait().await;
    }

    let _ = scheduler_task.await;
    tracing::info!("Shutdown complete");
    Ok(())
}
