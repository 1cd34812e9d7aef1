use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("docdb.{0} must not be empty")]
    Empty(&'static str),

    #[error("docdb.negative_cache_size must be greater than 0")]
    InvalidNegativeCacheSize,
}

fn default_collection() -> String {
    "entities".to_string()
}

fn default_negative_cache_ttl_secs() -> u64 {
    30
}

fn default_negative_cache_size() -> u64 {
    10_000
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// MongoDB connection string, e.g. `mongodb://host:27017/?tls=true`.
    pub uri: String,
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_negative_cache_ttl_secs")]
    pub negative_cache_ttl_secs: u64,
    #[serde(default = "default_negative_cache_size")]
    pub negative_cache_size: u64,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("uri", &self.uri),
            ("database", &self.database),
            ("collection", &self.collection),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::Empty(name));
            }
        }

        if self.negative_cache_size == 0 {
            return Err(ValidationError::InvalidNegativeCacheSize);
        }

        Ok(())
    }

    pub fn negative_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_cache_ttl_secs)
    }
}
