use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("api.batch_size must be greater than 0")]
    InvalidBatchSize,

    #[error("search.index_prefix must not be empty")]
    EmptyIndexPrefix,
}

/// Which document store backs the cache.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Mongo,
    /// Process-local store; contents are lost on restart.
    Memory,
}

fn default_batch_size() -> usize {
    500
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for API requests
    pub listener: Listener,
    /// Listener for health, readiness and metric descriptions
    pub admin_listener: Listener,
    /// Maximum number of entity ids sent to the metrics backend in one query
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub default_store: StoreKind,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.batch_size == 0 {
            return Err(ValidationError::InvalidBatchSize);
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

fn default_index_prefix() -> String {
    "visibly-metrics".to_string()
}

fn default_search_timeout_secs() -> u64 {
    10
}

/// Elasticsearch cluster holding daily performance rows.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SearchConfig {
    pub url: Url,
    /// Indices are named `{index_prefix}-sa` and `{index_prefix}-dsp`.
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.index_prefix.trim().is_empty() {
            return Err(ValidationError::EmptyIndexPrefix);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
listener:
  host: 0.0.0.0
  port: 8080
admin_listener:
  host: 127.0.0.1
  port: 8081
default_store: memory
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.default_store, StoreKind::Memory);

        let mut invalid = config.clone();
        invalid.admin_listener.port = 0;
        assert!(matches!(
            invalid.validate(),
            Err(ValidationError::InvalidPort)
        ));

        let mut invalid = config;
        invalid.batch_size = 0;
        assert!(matches!(
            invalid.validate(),
            Err(ValidationError::InvalidBatchSize)
        ));
    }

    #[test]
    fn test_parse_search_config() {
        let config: SearchConfig =
            serde_yaml::from_str("url: http://search.internal:9200").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.index_prefix, "visibly-metrics");
        assert_eq!(config.timeout_secs, 10);
    }
}
