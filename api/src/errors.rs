use crate::performance::MetricsError;
use amazon_ads::{AdsError, KeyError};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use docdb_cache::QueryError;
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("missing Amazon-Advertising-API-Scope header")]
    MissingScope,

    #[error("missing query parameter `{0}`")]
    MissingParam(&'static str),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    InvalidKey(#[from] KeyError),

    #[error(transparent)]
    InvalidQuery(#[from] QueryError),

    #[error(transparent)]
    Vendor(#[from] AdsError),

    #[error("performance metrics unavailable: {0}")]
    Metrics(#[from] MetricsError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownResource(_) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MissingScope
            | ApiError::MissingParam(_)
            | ApiError::InvalidBody(_)
            | ApiError::InvalidKey(_)
            | ApiError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ApiError::Vendor(e) => match e {
                AdsError::InvalidQuery(_) | AdsError::Key(_) => StatusCode::BAD_REQUEST,
                AdsError::Unsupported(_) => StatusCode::METHOD_NOT_ALLOWED,
                AdsError::Status { status, .. } if status.is_client_error() => *status,
                _ => StatusCode::BAD_GATEWAY,
            },
            ApiError::Metrics(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(ApiErrorResponse {
            error_message: self.to_string(),
        });

        (status, body).into_response()
    }
}
