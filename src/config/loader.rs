//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ConsoleConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from an optional TOML file, apply environment overrides, validate.
///
/// Without a file every section starts from its defaults, which lets container
/// deployments run on environment variables alone.
pub fn load_config(path: Option<&Path>) -> Result<ConsoleConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => ConsoleConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment variables on top of file/default values.
///
/// - `HAPROXY_DATAPLANE_BASE_URL`, `HAPROXY_DATAPLANE_USER`, `HAPROXY_DATAPLANE_PASS`
/// - `HAPROXY_METRICS_URL`, or `HAPROXY_EXPORTER_PORT` to target `localhost:<port>/metrics`
/// - `CONSOLE_API_KEY`
pub fn apply_env_overrides<F>(config: &mut ConsoleConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("HAPROXY_DATAPLANE_BASE_URL") {
        config.dataplane.base_url = url;
    }
    if let Some(user) = lookup("HAPROXY_DATAPLANE_USER") {
        config.dataplane.username = user;
    }
    if let Some(pass) = lookup("HAPROXY_DATAPLANE_PASS") {
        config.dataplane.password = pass;
    }

    match (lookup("HAPROXY_METRICS_URL"), lookup("HAPROXY_EXPORTER_PORT")) {
        (Some(url), _) => config.metrics_feed.url = url,
        (None, Some(port)) => {
            config.metrics_feed.url = format!("http://localhost:{}/metrics", port.trim());
        }
        (None, None) => {}
    }

    if let Some(key) = lookup("CONSOLE_API_KEY") {
        config.api.api_key = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_credentials() {
        let mut config = ConsoleConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("HAPROXY_DATAPLANE_BASE_URL", "http://lb:5555"),
                ("HAPROXY_DATAPLANE_USER", "ops"),
                ("HAPROXY_DATAPLANE_PASS", "secret"),
            ]),
        );
        assert_eq!(config.dataplane.base_url, "http://lb:5555");
        assert_eq!(config.dataplane.username, "ops");
        assert_eq!(config.dataplane.password, "secret");
        assert_eq!(config.metrics_feed.url, "http://localhost:8405/metrics");
    }

    #[test]
    fn test_metrics_url_precedence() {
        let mut config = ConsoleConfig::default();
        apply_env_overrides(&mut config, env(&[("HAPROXY_EXPORTER_PORT", "9101")]));
        assert_eq!(config.metrics_feed.url, "http://localhost:9101/metrics");

        let mut config = ConsoleConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("HAPROXY_EXPORTER_PORT", "9101"),
                ("HAPROXY_METRICS_URL", "http://exporter/metrics"),
            ]),
        );
        assert_eq!(config.metrics_feed.url, "http://exporter/metrics");
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config(Some(Path::new("/nonexistent/console.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
