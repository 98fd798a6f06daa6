use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::dataplane::{
    AdminState, Backend, BackendDetails, Diagnostics, DiagnosticsReader, MutationReceipt, Mutator,
    RuntimeFetcher, RuntimeRow, Server, TopologyReader, Transport,
};
use crate::exposition::MetricFamily;
use crate::poller::Poller;
use crate::rates::HistoryPoint;
use crate::view::{BackendView, RankedServer};

const DEFAULT_TOP_LIMIT: usize = 5;

/// Shared state of the console API.
#[derive(Clone)]
pub struct ApiState {
    pub mutator: Mutator,
    pub topology: TopologyReader,
    pub runtime: RuntimeFetcher,
    pub diagnostics: DiagnosticsReader,
    pub poller: Arc<Poller>,
    pub api_key: Arc<str>,
}

impl ApiState {
    pub fn new(transport: Arc<dyn Transport>, poller: Arc<Poller>, api_key: &str) -> Self {
        Self {
            mutator: Mutator::new(transport.clone()),
            topology: TopologyReader::new(transport.clone()),
            runtime: RuntimeFetcher::new(transport.clone()),
            diagnostics: DiagnosticsReader::new(transport),
            poller,
            api_key: Arc::from(api_key),
        }
    }

    /// Re-poll a tracked backend in the background so its view catches up
    /// with a mutation.
    fn refresh(&self, backend: &str) {
        if !self.poller.is_tracked(backend) {
            return;
        }
        let poller = self.poller.clone();
        let backend = backend.to_string();
        tokio::spawn(async move {
            let _ = poller.tick(&backend).await;
        });
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub tracked_backends: usize,
    pub stale_views: usize,
}

#[derive(Serialize)]
pub struct BackendSummary {
    pub name: String,
    pub polled: bool,
    pub stale: bool,
    pub servers: usize,
    pub last_success_ms: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Serialize)]
pub struct ViewResponse {
    pub backend: String,
    pub stale: bool,
    pub last_error: Option<String>,
    pub last_success_ms: Option<u64>,
    pub last_attempt_ms: u64,
    pub view: Option<BackendView>,
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub metrics_count: usize,
    pub raw_length: usize,
    pub metrics: Vec<MetricFamily>,
}

#[derive(Deserialize)]
pub struct TopServersQuery {
    pub metric: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct TopServersResponse {
    pub metric: String,
    pub servers: Vec<RankedServer>,
}

#[derive(Deserialize)]
pub struct RenameRequest {
    pub new_name: String,
}

#[derive(Deserialize)]
pub struct StateRequest {
    pub admin_state: AdminState,
}

pub async fn get_status(State(state): State<ApiState>) -> Json<SystemStatus> {
    let stale = state.poller.store().stale_count();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if stale == 0 { "operational" } else { "degraded" },
        tracked_backends: state.poller.tracked().len(),
        stale_views: stale,
    })
}

pub async fn list_backends(State(state): State<ApiState>) -> Json<Vec<BackendSummary>> {
    let store = state.poller.store();
    let summaries = state
        .poller
        .tracked()
        .into_iter()
        .map(|name| match store.get(&name) {
            Some(published) => BackendSummary {
                servers: published.view.as_ref().map_or(0, |v| v.servers.len()),
                polled: true,
                stale: published.stale,
                last_success_ms: published.last_success_ms,
                last_error: published.last_error,
                name,
            },
            None => BackendSummary {
                name,
                polled: false,
                stale: false,
                servers: 0,
                last_success_ms: None,
                last_error: None,
            },
        })
        .collect();
    Json(summaries)
}

pub async fn create_backend(
    State(state): State<ApiState>,
    payload: Result<Json<Backend>, JsonRejection>,
) -> Result<(StatusCode, Json<MutationReceipt>), ApiError> {
    let backend = body(payload)?;
    if backend.name.trim().is_empty() {
        return Err(ApiError::BadRequest("backend name must not be empty".into()));
    }

    let receipt = state.mutator.create_backend(&backend).await?;
    state.poller.track(&backend.name);
    state.refresh(&backend.name);
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn get_backend(
    State(state): State<ApiState>,
    Path(backend): Path<String>,
) -> Result<Json<BackendDetails>, ApiError> {
    Ok(Json(state.topology.backend_details(&backend).await?))
}

pub async fn delete_backend(
    State(state): State<ApiState>,
    Path(backend): Path<String>,
) -> Result<Json<MutationReceipt>, ApiError> {
    let receipt = state.mutator.delete_backend(&backend).await?;
    state.poller.untrack(&backend);
    Ok(Json(receipt))
}

pub async fn get_view(
    State(state): State<ApiState>,
    Path(backend): Path<String>,
) -> Result<Json<ViewResponse>, ApiError> {
    let published = state
        .poller
        .store()
        .get(&backend)
        .ok_or_else(|| ApiError::NotFound(format!("backend '{}' has not been polled", backend)))?;

    Ok(Json(ViewResponse {
        backend,
        stale: published.stale,
        last_error: published.last_error,
        last_success_ms: published.last_success_ms,
        last_attempt_ms: published.last_attempt_ms,
        view: published.view.map(|v| (*v).clone()),
    }))
}

pub async fn get_history(
    State(state): State<ApiState>,
    Path(backend): Path<String>,
) -> Result<Json<std::collections::BTreeMap<String, Vec<HistoryPoint>>>, ApiError> {
    state
        .poller
        .history(&backend)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("backend '{}' is not tracked", backend)))
}

pub async fn get_runtime(
    State(state): State<ApiState>,
    Path(backend): Path<String>,
) -> Result<Json<Vec<RuntimeRow>>, ApiError> {
    Ok(Json(state.runtime.runtime_rows(&backend).await?))
}

pub async fn create_server(
    State(state): State<ApiState>,
    Path(backend): Path<String>,
    payload: Result<Json<Server>, JsonRejection>,
) -> Result<(StatusCode, Json<MutationReceipt>), ApiError> {
    let server = body(payload)?;
    let receipt = state.mutator.create_server(&backend, &server).await?;
    state.refresh(&backend);
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn delete_server(
    State(state): State<ApiState>,
    Path((backend, server)): Path<(String, String)>,
) -> Result<Json<MutationReceipt>, ApiError> {
    let receipt = state.mutator.delete_server(&backend, &server).await?;
    state.refresh(&backend);
    Ok(Json(receipt))
}

pub async fn replace_server(
    State(state): State<ApiState>,
    Path((backend, name)): Path<(String, String)>,
    payload: Result<Json<Server>, JsonRejection>,
) -> Result<Json<MutationReceipt>, ApiError> {
    let server = body(payload)?;
    if server.name != name {
        return Err(ApiError::BadRequest(format!(
            "body names server '{}' but path names '{}'; use rename",
            server.name, name
        )));
    }
    let receipt = state.mutator.replace_server(&backend, &name, &server).await?;
    state.refresh(&backend);
    Ok(Json(receipt))
}

pub async fn rename_server(
    State(state): State<ApiState>,
    Path((backend, name)): Path<(String, String)>,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> Result<Json<MutationReceipt>, ApiError> {
    let request = body(payload)?;
    let receipt = state
        .mutator
        .rename_server(&backend, &name, &request.new_name)
        .await?;
    state.refresh(&backend);
    Ok(Json(receipt))
}

pub async fn set_server_state(
    State(state): State<ApiState>,
    Path((backend, name)): Path<(String, String)>,
    payload: Result<Json<StateRequest>, JsonRejection>,
) -> Result<Json<MutationReceipt>, ApiError> {
    let request = body(payload)?;
    let receipt = state
        .mutator
        .set_server_runtime_state(&backend, &name, request.admin_state)
        .await?;
    state.refresh(&backend);
    Ok(Json(receipt))
}

pub async fn get_diagnostics(State(state): State<ApiState>) -> Result<Json<Diagnostics>, ApiError> {
    Ok(Json(state.diagnostics.collect().await?))
}

/// Scrape the exporter now and return every parsed family.
pub async fn get_metrics(State(state): State<ApiState>) -> Result<Json<MetricsResponse>, ApiError> {
    let scrape = state.poller.ingestor().scrape_sized().await?;
    Ok(Json(MetricsResponse {
        metrics_count: scrape.set.len(),
        raw_length: scrape.raw_length,
        metrics: scrape.set.families().to_vec(),
    }))
}

/// Highest current rates of one tracked metric across all published views.
pub async fn get_top_servers(
    State(state): State<ApiState>,
    Query(query): Query<TopServersQuery>,
) -> Result<Json<TopServersResponse>, ApiError> {
    let rate_metrics = state.poller.rate_metrics();
    let metric = match query.metric {
        Some(metric) if rate_metrics.contains(&metric) => metric,
        Some(metric) => {
            return Err(ApiError::BadRequest(format!("'{}' is not a rate metric", metric)));
        }
        None => rate_metrics
            .first()
            .cloned()
            .ok_or_else(|| ApiError::BadRequest("no rate metrics configured".into()))?,
    };
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT);

    let servers = state.poller.store().top_servers(&metric, limit);
    Ok(Json(TopServersResponse { metric, servers }))
}
