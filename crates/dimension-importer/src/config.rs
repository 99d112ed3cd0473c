//! Service configuration, loaded from the environment.

use crate::handler::DEFAULT_MAX_WORKERS;
use dimension_importer_client::{ClientConfig, DEFAULT_BATCH_SIZE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub dataset_api_url: String,
    pub service_auth_token: Option<String>,
    /// Dimension options fetched per dataset API request
    pub dimensions_batch_size: usize,
    /// Concurrent dimension workers per instance
    pub max_workers: usize,
    /// Instances imported concurrently
    pub max_concurrent_instances: usize,
    pub http_timeout_secs: u64,
    /// JSON snapshot of the graph; in-memory only when unset
    pub graph_snapshot_path: Option<PathBuf>,
    /// Name reported in failure events
    pub service_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_api_url: "http://localhost:22000".to_string(),
            service_auth_token: None,
            dimensions_batch_size: DEFAULT_BATCH_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
            max_concurrent_instances: 4,
            http_timeout_secs: 30,
            graph_snapshot_path: None,
            service_name: "dimension-importer".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl Config {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("DATASET_API_URL") {
            config.dataset_api_url = url;
        }
        if let Some(token) = lookup("SERVICE_AUTH_TOKEN").filter(|t| !t.is_empty()) {
            config.service_auth_token = Some(token);
        }
        if let Some(value) = lookup("BATCH_SIZE") {
            config.dimensions_batch_size = parse_number("BATCH_SIZE", value)?;
        }
        if let Some(value) = lookup("DIMENSIONS_MAX_PARALLELISM") {
            config.max_workers = parse_number("DIMENSIONS_MAX_PARALLELISM", value)?;
        }
        if let Some(value) = lookup("MAX_CONCURRENT_INSTANCES") {
            config.max_concurrent_instances = parse_number("MAX_CONCURRENT_INSTANCES", value)?;
        }
        if let Some(value) = lookup("HTTP_TIMEOUT_SECS") {
            config.http_timeout_secs = parse_number("HTTP_TIMEOUT_SECS", value)?;
        }
        if let Some(path) = lookup("GRAPH_SNAPSHOT_PATH").filter(|p| !p.is_empty()) {
            config.graph_snapshot_path = Some(PathBuf::from(path));
        }
        if let Some(name) = lookup("SERVICE_NAME") {
            config.service_name = name;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("BATCH_SIZE", self.dimensions_batch_size),
            ("DIMENSIONS_MAX_PARALLELISM", self.max_workers),
            ("MAX_CONCURRENT_INSTANCES", self.max_concurrent_instances),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if self.dataset_api_url.is_empty() {
            return Err(ConfigError::Invalid {
                key: "DATASET_API_URL",
                value: String::new(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.dataset_api_url.clone(),
            service_auth_token: self.service_auth_token.clone(),
            batch_size: self.dimensions_batch_size,
            timeout_secs: self.http_timeout_secs,
        }
    }

    /// Copy safe to print: the auth token is masked.
    pub fn redacted(&self) -> Self {
        Self {
            service_auth_token: self.service_auth_token.as_ref().map(|_| "***".to_string()),
            ..self.clone()
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|err| ConfigError::Invalid {
        key,
        reason: err.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("DATASET_API_URL", "http://dataset-api:22000"),
            ("SERVICE_AUTH_TOKEN", "token"),
            ("BATCH_SIZE", "50"),
            ("DIMENSIONS_MAX_PARALLELISM", "3"),
            ("GRAPH_SNAPSHOT_PATH", "/tmp/graph.json"),
        ]))
        .unwrap();

        assert_eq!(config.dataset_api_url, "http://dataset-api:22000");
        assert_eq!(config.dimensions_batch_size, 50);
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.graph_snapshot_path, Some(PathBuf::from("/tmp/graph.json")));

        let client = config.client_config();
        assert_eq!(client.batch_size, 50);
        assert_eq!(client.service_auth_token.as_deref(), Some("token"));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = Config::from_lookup(lookup(&[("BATCH_SIZE", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "BATCH_SIZE", .. }));

        let err = Config::from_lookup(lookup(&[("DIMENSIONS_MAX_PARALLELISM", "0")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "DIMENSIONS_MAX_PARALLELISM",
                ..
            }
        ));
    }

    #[test]
    fn redacted_masks_token() {
        let config = Config {
            service_auth_token: Some("secret".to_string()),
            ..Config::default()
        };
        assert_eq!(config.redacted().service_auth_token.as_deref(), Some("***"));
    }
}
