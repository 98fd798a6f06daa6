//! Scraping the counter feed and extracting per-server samples.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::MetricsFeedConfig;
use crate::dataplane::client::transport_error;
use crate::dataplane::runtime::AGGREGATE_ROWS;
use crate::dataplane::types::{DataplaneError, DataplaneResult};
use crate::exposition::parser::{parse_exposition, MetricSet};
use crate::rates::CounterSample;

/// Where exposition text comes from.
#[async_trait]
pub trait ExpositionSource: Send + Sync {
    async fn fetch_text(&self) -> DataplaneResult<String>;
}

/// Scrapes the exporter over HTTP.
#[derive(Debug, Clone)]
pub struct HttpExpositionSource {
    http: reqwest::Client,
    url: String,
}

impl HttpExpositionSource {
    pub fn new(config: &MetricsFeedConfig) -> DataplaneResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| transport_error(&config.url, &e))?;
        Ok(Self {
            http,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl ExpositionSource for HttpExpositionSource {
    async fn fetch_text(&self) -> DataplaneResult<String> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| transport_error(&self.url, &e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&self.url, &e))?;

        if !(200..300).contains(&status) {
            return Err(DataplaneError::Upstream { status, body });
        }
        Ok(body)
    }
}

/// Pulls and parses the feed. A failed fetch or parse yields an error and nothing else.
#[derive(Clone)]
pub struct MetricsIngestor {
    source: Arc<dyn ExpositionSource>,
}

impl MetricsIngestor {
    pub fn new(source: Arc<dyn ExpositionSource>) -> Self {
        Self { source }
    }

    pub async fn scrape(&self) -> DataplaneResult<MetricSet> {
        self.scrape_sized().await.map(|scrape| scrape.set)
    }

    /// Like [`scrape`](Self::scrape), also reporting the payload size.
    pub async fn scrape_sized(&self) -> DataplaneResult<Scrape> {
        let text = self.source.fetch_text().await?;
        let set = parse_exposition(&text)?;
        tracing::debug!(families = set.len(), bytes = text.len(), "Metrics feed parsed");
        Ok(Scrape {
            set,
            raw_length: text.len(),
        })
    }
}

/// A parsed feed and the byte length of the text it was parsed from.
#[derive(Debug, Clone)]
pub struct Scrape {
    pub set: MetricSet,
    pub raw_length: usize,
}

impl MetricSet {
    /// Per-server counter samples of `backend` for the given families.
    ///
    /// Rows are attributed through the `proxy` label. Aggregate rows and
    /// values that are not finite non-negative numbers are skipped.
    pub fn server_counters(&self, backend: &str, metrics: &[String], at: Instant) -> Vec<CounterSample> {
        let mut samples = Vec::new();

        for metric in metrics {
            let Some(family) = self.family(metric) else {
                continue;
            };

            for sample in &family.samples {
                if sample.label("proxy") != Some(backend) {
                    continue;
                }
                let Some(server) = sample.label("server") else {
                    continue;
                };
                if AGGREGATE_ROWS.contains(&server) {
                    continue;
                }

                match sample.value.parse::<f64>() {
                    Ok(v) if v.is_finite() && v >= 0.0 => samples.push(CounterSample {
                        server: server.to_string(),
                        metric: metric.clone(),
                        value: v as u64,
                        at,
                    }),
                    _ => {
                        tracing::debug!(metric = %metric, server, value = %sample.value, "Skipping non-counter value");
                    }
                }
            }
        }

        samples
    }
}
