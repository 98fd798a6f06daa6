//! Authenticated HTTP transport for the Data Plane API.
//!
//! # Responsibilities
//! - Resolve request paths against the configured base URL
//! - Inject Basic-Auth credentials on every call
//! - Enforce the configured connect/request timeouts
//! - Pass status, headers and body through untouched
//!
//! The client never retries and never interprets status codes; that is left
//! to the reader and mutator layers built on the [`Transport`] trait.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::DataplaneConfig;
use crate::dataplane::types::{DataplaneError, DataplaneResult};

/// A single call against the control plane.
#[derive(Debug, Clone, PartialEq)]
pub struct DataplaneRequest {
    pub method: Method,
    /// Absolute path including any query string, e.g. `/v3/info`.
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl DataplaneRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::PUT,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
            body: None,
        }
    }
}

/// Raw response as returned by the control plane.
#[derive(Debug, Clone)]
pub struct DataplaneResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl DataplaneResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx read response into [`DataplaneError::Upstream`].
    pub fn ensure_success(self) -> DataplaneResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(DataplaneError::Upstream {
                status: self.status,
                body: self.body,
            })
        }
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> DataplaneResult<T> {
        serde_json::from_str(&self.body).map_err(|e| DataplaneError::Decode(e.to_string()))
    }
}

/// Seam between the business layers and the network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one request. Only network failures are errors; every HTTP status is a response.
    async fn call(&self, request: DataplaneRequest) -> DataplaneResult<DataplaneResponse>;
}

/// reqwest-backed [`Transport`] for the Data Plane API.
#[derive(Clone)]
pub struct DataplaneClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
}

impl DataplaneClient {
    /// Build a client from configuration.
    pub fn new(config: &DataplaneConfig) -> DataplaneResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| DataplaneError::Transport {
            target: config.base_url.clone(),
            reason: format!("invalid base URL: {}", e),
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| DataplaneError::Transport {
                target: config.base_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

}

#[async_trait]
impl Transport for DataplaneClient {
    async fn call(&self, request: DataplaneRequest) -> DataplaneResult<DataplaneResponse> {
        let url = self
            .base_url
            .join(&request.path)
            .map_err(|e| DataplaneError::Transport {
                target: request.path.clone(),
                reason: format!("invalid path: {}", e),
            })?;

        tracing::debug!(method = %request.method, url = %url, "Data Plane API call");

        let mut builder = self
            .http
            .request(request.method.clone(), url.clone())
            .basic_auth(&self.username, Some(&self.password));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(url.as_str(), &e))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(url.as_str(), &e))?;

        if !(200..300).contains(&status) {
            tracing::debug!(method = %request.method, url = %url, status, "Data Plane API non-success status");
        }

        Ok(DataplaneResponse {
            status,
            headers,
            body,
        })
    }
}

impl std::fmt::Debug for DataplaneClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataplaneClient")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .finish()
    }
}

pub(crate) fn transport_error(target: &str, err: &reqwest::Error) -> DataplaneError {
    let reason = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    };
    DataplaneError::Transport {
        target: target.to_string(),
        reason,
    }
}

/// Percent-encode a value as a single path segment. Spaces become `%20`.
pub fn encode_segment(value: &str) -> String {
    // the form serializer escapes a literal '+' as %2B, so every '+' it
    // emits stands for a space
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .map(|chunk| if chunk == "+" { "%20" } else { chunk })
        .collect()
}

/// Encode a query-string value.
pub fn encode_query(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_success_passes_body_through() {
        let ok = DataplaneResponse::new(204, "").ensure_success();
        assert!(ok.is_ok());

        let err = DataplaneResponse::new(404, "no such backend")
            .ensure_success()
            .unwrap_err();
        assert_eq!(
            err,
            DataplaneError::Upstream {
                status: 404,
                body: "no such backend".into()
            }
        );
    }

    #[test]
    fn test_json_decode_error() {
        let response = DataplaneResponse::new(200, "<html>");
        let result: DataplaneResult<Vec<String>> = response.json();
        assert!(matches!(result, Err(DataplaneError::Decode(_))));
    }

    #[test]
    fn test_invalid_base_url() {
        let config = DataplaneConfig {
            base_url: "::nope".into(),
            ..DataplaneConfig::default()
        };
        assert!(matches!(
            DataplaneClient::new(&config),
            Err(DataplaneError::Transport { .. })
        ));
    }

    #[test]
    fn test_segment_encoding() {
        assert_eq!(encode_segment("app_be"), "app_be");
        assert_eq!(encode_segment("a/b"), "a%2Fb");
        assert_eq!(encode_segment("web 1"), "web%201");
        assert_eq!(encode_segment("a+b"), "a%2Bb");
        assert_eq!(encode_query("web 1"), "web+1");
    }

    #[test]
    fn test_encoded_segment_survives_join() {
        let base = Url::parse("http://localhost:5555/").unwrap();
        let path = format!("/v3/services/haproxy/configuration/backends/{}/servers", encode_segment("app be"));
        let url = base.join(&path).unwrap();
        assert_eq!(url.path(), "/v3/services/haproxy/configuration/backends/app%20be/servers");
    }
}
