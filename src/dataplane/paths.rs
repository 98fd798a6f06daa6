//! Data Plane API v3 endpoint paths.

use crate::dataplane::client::{encode_query, encode_segment};
use crate::dataplane::types::ConfigVersion;

const CONFIGURATION: &str = "/v3/services/haproxy/configuration";
const RUNTIME: &str = "/v3/services/haproxy/runtime";
const STATS: &str = "/v3/services/haproxy/stats/native";

pub const INFO: &str = "/v3/info";
pub const HEALTH: &str = "/v3/health";
pub const RUNTIME_INFO: &str = "/v3/services/haproxy/runtime/info";

pub fn config_version() -> String {
    format!("{}/version", CONFIGURATION)
}

pub fn backends(version: ConfigVersion) -> String {
    format!("{}/backends?version={}", CONFIGURATION, version)
}

pub fn backend(name: &str, version: ConfigVersion) -> String {
    format!("{}/backends/{}?version={}", CONFIGURATION, encode_segment(name), version)
}

pub fn servers(backend: &str) -> String {
    format!("{}/backends/{}/servers", CONFIGURATION, encode_segment(backend))
}

pub fn servers_versioned(backend: &str, version: ConfigVersion) -> String {
    format!("{}?version={}", servers(backend), version)
}

pub fn server(backend: &str, name: &str) -> String {
    format!("{}/{}", servers(backend), encode_segment(name))
}

pub fn server_versioned(backend: &str, name: &str, version: ConfigVersion) -> String {
    format!("{}?version={}", server(backend, name), version)
}

pub fn runtime_servers(backend: &str) -> String {
    format!("{}/backends/{}/servers", RUNTIME, encode_segment(backend))
}

pub fn runtime_server(backend: &str, name: &str) -> String {
    format!("{}/{}", runtime_servers(backend), encode_segment(name))
}

pub fn server_stats(backend: &str) -> String {
    format!("{}?type=server&parent={}", STATS, encode_query(backend))
}

pub fn backend_stats(backend: &str) -> String {
    format!("{}?type=backend&name={}", STATS, encode_query(backend))
}
