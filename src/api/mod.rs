//! Console HTTP API.
//!
//! A thin axum layer over the poller's views and the mutator. Every route
//! sits behind the bearer-key middleware.

pub mod auth;
pub mod error;
pub mod handlers;

use std::time::Duration;

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::lifecycle::Shutdown;

use self::auth::require_api_key;
use self::handlers::*;

pub use self::error::ApiError;
pub use self::handlers::ApiState;

pub fn router(state: ApiState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/backends", get(list_backends).post(create_backend))
        .route("/api/backends/{backend}", get(get_backend).delete(delete_backend))
        .route("/api/backends/{backend}/view", get(get_view))
        .route("/api/backends/{backend}/history", get(get_history))
        .route("/api/backends/{backend}/runtime", get(get_runtime))
        .route("/api/backends/{backend}/servers", post(create_server))
        .route(
            "/api/backends/{backend}/servers/{server}",
            put(replace_server).delete(delete_server),
        )
        .route("/api/backends/{backend}/servers/{server}/rename", post(rename_server))
        .route("/api/backends/{backend}/servers/{server}/state", put(set_server_state))
        .route("/api/diagnostics", get(get_diagnostics))
        .route("/api/metrics", get(get_metrics))
        .route("/api/top-servers", get(get_top_servers))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Serve the API until `shutdown` fires.
pub async fn serve(listener: TcpListener, app: Router, shutdown: &Shutdown) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Console API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait())
        .await?;

    tracing::info!("Console API stopped");
    Ok(())
}
