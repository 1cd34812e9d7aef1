use crate::key::KeyError;
use reqwest::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum AdsError {
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("vendor returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("vendor unavailable after {0} retries")]
    RetriesExceeded(u32),

    #[error("token refresh failed: {0}")]
    Auth(String),

    #[error("unexpected vendor response: {0}")]
    UnexpectedResponse(String),

    #[error("operation not supported for {0}")]
    Unsupported(&'static str),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid identifier: {0}")]
    Key(#[from] KeyError),
}
