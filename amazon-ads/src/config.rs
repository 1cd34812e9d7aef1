use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("amazon_ads.{0} must not be empty")]
    EmptyCredential(&'static str),

    #[error("amazon_ads.page_size must be between 1 and {max}")]
    InvalidPageSize { max: u32 },

    #[error("amazon_ads.timeout_secs must be greater than 0")]
    InvalidTimeout,
}

/// Amazon Advertising API regions. Each region has its own API host and its
/// own Login with Amazon token endpoint.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Na,
    Eu,
    Fe,
}

impl Region {
    pub const fn api_url(&self) -> &'static str {
        match self {
            Region::Na => "https://advertising-api.amazon.com",
            Region::Eu => "https://advertising-api-eu.amazon.com",
            Region::Fe => "https://advertising-api-fe.amazon.com",
        }
    }

    pub const fn token_url(&self) -> &'static str {
        match self {
            Region::Na => "https://api.amazon.com/auth/o2/token",
            Region::Eu => "https://api.amazon.co.uk/auth/o2/token",
            Region::Fe => "https://api.amazon.co.jp/auth/o2/token",
        }
    }
}

pub const MAX_PAGE_SIZE: u32 = 5000;

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    100
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub region: Region,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    /// Overrides the regional API host. Mostly useful for sandboxes and tests.
    pub api_url: Option<Url>,
    /// Overrides the regional token endpoint.
    pub token_url: Option<Url>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("refresh_token", &self.refresh_token),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyCredential(name));
            }
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ValidationError::InvalidPageSize { max: MAX_PAGE_SIZE });
        }

        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }

        Ok(())
    }

    pub fn api_url(&self) -> Result<Url, url::ParseError> {
        match &self.api_url {
            Some(url) => Ok(url.clone()),
            None => Url::parse(self.region.api_url()),
        }
    }

    pub fn token_url(&self) -> Result<Url, url::ParseError> {
        match &self.token_url {
            Some(url) => Ok(url.clone()),
            None => Url::parse(self.region.token_url()),
        }
    }
}
