use amazon_ads::config::Config as AmazonAdsConfig;
use api::config::{Config as ApiConfig, SearchConfig, StoreKind};
use docdb_cache::config::Config as DocdbConfig;
use serde::Deserialize;
use std::fs::File;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
    pub api: ApiConfig,
    pub amazon_ads: AmazonAdsConfig,
    /// Required unless the in-memory store is used.
    pub docdb: Option<DocdbConfig>,
    pub search: SearchConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    pub fn validate(&self, store: StoreKind) -> Result<(), ConfigError> {
        self.api.validate()?;
        self.amazon_ads.validate()?;
        self.search.validate()?;

        match (&self.docdb, store) {
            (Some(docdb), _) => docdb.validate()?,
            (None, StoreKind::Mongo) => return Err(ConfigError::MissingDocdb),
            (None, StoreKind::Memory) => {}
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid api config: {0}")]
    Api(#[from] api::config::ValidationError),
    #[error("invalid amazon_ads config: {0}")]
    AmazonAds(#[from] amazon_ads::config::ValidationError),
    #[error("invalid docdb config: {0}")]
    Docdb(#[from] docdb_cache::config::ValidationError),
    #[error("the mongo store requires a docdb section")]
    MissingDocdb,
}
