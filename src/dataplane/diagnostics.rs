//! Control plane and HAProxy process diagnostics.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::dataplane::client::{DataplaneRequest, Transport};
use crate::dataplane::paths;
use crate::dataplane::types::DataplaneResult;

const UNKNOWN: &str = "Unknown";

/// Summary of the Data Plane API and the HAProxy process behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub api_version: String,
    pub build_date: Option<String>,
    pub health: String,
    pub haproxy_version: String,
    pub haproxy_pid: Option<u64>,
    pub haproxy_uptime: String,
    pub haproxy_processes: u64,
    pub haproxy_total_bytes_out: u64,
}

#[derive(Clone)]
pub struct DiagnosticsReader {
    transport: Arc<dyn Transport>,
}

impl DiagnosticsReader {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Collect diagnostics. Only the API info call is required; health and
    /// process info fall back to "Unknown" when unavailable.
    pub async fn collect(&self) -> DataplaneResult<Diagnostics> {
        let (info, health, runtime) = tokio::join!(
            self.get_json(paths::INFO),
            self.get_json(paths::HEALTH),
            self.get_json(paths::RUNTIME_INFO),
        );
        let info = info?;

        let health = match health {
            Ok(h) => str_at(&h, &["haproxy"]).unwrap_or(UNKNOWN).to_string(),
            Err(e) => {
                tracing::debug!(error = %e, "Health endpoint unavailable");
                UNKNOWN.to_string()
            }
        };
        let runtime = runtime
            .map_err(|e| tracing::debug!(error = %e, "Runtime info unavailable"))
            .unwrap_or(Value::Null);

        Ok(Diagnostics {
            api_version: str_at(&info, &["api", "version"]).unwrap_or(UNKNOWN).to_string(),
            build_date: str_at(&info, &["api", "build_date"]).map(str::to_string),
            health,
            haproxy_version: str_at(&runtime, &["info", "version"])
                .unwrap_or(UNKNOWN)
                .to_string(),
            haproxy_pid: u64_at(&runtime, &["info", "pid"]),
            haproxy_uptime: format_uptime(u64_at(&runtime, &["info", "uptime"]).unwrap_or(0)),
            haproxy_processes: u64_at(&runtime, &["info", "processes"]).unwrap_or(0),
            haproxy_total_bytes_out: u64_at(&runtime, &["info", "total_bytes_out"]).unwrap_or(0),
        })
    }

    async fn get_json(&self, path: &str) -> DataplaneResult<Value> {
        self.transport
            .call(DataplaneRequest::get(path))
            .await?
            .ensure_success()?
            .json()
    }
}

/// Render seconds as `"{d}d {h}h {m}m {s}s"`; zero means not reported.
pub fn format_uptime(seconds: u64) -> String {
    if seconds == 0 {
        return UNKNOWN.to_string();
    }
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;
    format!("{}d {}h {}m {}s", days, hours, minutes, secs)
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(key))
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    lookup(value, path).and_then(Value::as_str)
}

fn u64_at(value: &Value, path: &[&str]) -> Option<u64> {
    lookup(value, path).and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::client::DataplaneResponse;
    use crate::dataplane::types::DataplaneError;
    use crate::testing::ScriptedTransport;
    use serde_json::json;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(0), "Unknown");
        assert_eq!(format_uptime(3935), "0d 1h 5m 35s");
        assert_eq!(format_uptime(90_061), "1d 1h 1m 1s");
    }

    #[tokio::test]
    async fn test_optional_sources_degrade() {
        let transport = ScriptedTransport::new(|req| match req.path.as_str() {
            "/v3/info" => Ok(DataplaneResponse::new(
                200,
                json!({ "api": { "version": "v3.2.5 152e8a06", "build_date": "2025-01-01" } })
                    .to_string(),
            )),
            "/v3/health" => Ok(DataplaneResponse::new(200, r#"{"haproxy":"up"}"#)),
            _ => Ok(DataplaneResponse::new(503, "")),
        });

        let diag = DiagnosticsReader::new(transport).collect().await.unwrap();
        assert_eq!(diag.api_version, "v3.2.5 152e8a06");
        assert_eq!(diag.health, "up");
        assert_eq!(diag.haproxy_version, "Unknown");
        assert_eq!(diag.haproxy_pid, None);
        assert_eq!(diag.haproxy_uptime, "Unknown");
    }

    #[tokio::test]
    async fn test_info_is_required() {
        let transport = ScriptedTransport::new(|_| Ok(DataplaneResponse::new(401, "unauthorized")));
        let err = DiagnosticsReader::new(transport).collect().await.unwrap_err();
        assert_eq!(
            err,
            DataplaneError::Upstream {
                status: 401,
                body: "unauthorized".into()
            }
        );
    }
}
