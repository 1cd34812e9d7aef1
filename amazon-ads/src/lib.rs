//! Client facade for the Amazon Advertising APIs.
//!
//! Every supported resource is reachable through the same five calls of the
//! [`AdsApi`] trait. [`client::AdsClient`] talks to the vendor over HTTP;
//! other implementations (the document cache, test doubles) wrap or replace
//! it behind the same trait.

pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod key;
pub mod metrics_defs;
pub mod resource;

#[cfg(test)]
mod testutils;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub use errors::AdsError;
pub use key::{EntityKey, KeyError, KeyValue};
pub use resource::{Api, Resource};

/// A single vendor entity as returned by the API.
pub type Record = serde_json::Map<String, Value>;

/// Query-string parameters of a list call, kept sorted so that identical
/// requests produce identical vendor URLs.
pub type QueryParams = BTreeMap<String, String>;

pub const SUCCESS: &str = "SUCCESS";

/// The advertising profile every vendor call is scoped to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Scope {
    pub profile_id: String,
}

impl Scope {
    pub fn new(profile_id: impl Into<String>) -> Self {
        Scope {
            profile_id: profile_id.into(),
        }
    }
}

/// Per-item result of a create, update or destroy call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Outcome {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Remaining fields of the vendor item, usually the entity identifier.
    #[serde(flatten)]
    pub fields: Record,
}

impl Outcome {
    pub fn success(fields: Record) -> Self {
        Outcome {
            code: SUCCESS.to_string(),
            description: None,
            fields,
        }
    }

    /// Splits a vendor result item into its status and identifier fields.
    /// Items without a `code` are successful unless they carry errors.
    pub fn from_record(mut record: Record) -> Self {
        let has_errors = record.contains_key("errors") || record.contains_key("errorDetails");

        let code = match record.remove("code") {
            Some(Value::String(code)) => code,
            Some(other) => other.to_string(),
            None if has_errors => "ERROR".to_string(),
            None => SUCCESS.to_string(),
        };

        let description = ["description", "details"]
            .iter()
            .find_map(|field| record.remove(*field))
            .map(|value| match value {
                Value::String(s) => s,
                other => other.to_string(),
            });

        Outcome {
            code,
            description,
            fields: record,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS
    }
}

/// Uniform access to every Amazon Advertising resource.
#[async_trait]
pub trait AdsApi: Send + Sync {
    /// Lists entities. Vendor filters in `params` are passed through.
    async fn index(
        &self,
        scope: &Scope,
        resource: Resource,
        params: &QueryParams,
    ) -> Result<Vec<Record>, AdsError>;

    /// Fetches one entity; `None` when the vendor does not know it.
    async fn show(
        &self,
        scope: &Scope,
        resource: Resource,
        key: &EntityKey,
        params: &QueryParams,
    ) -> Result<Option<Record>, AdsError>;

    async fn create(
        &self,
        scope: &Scope,
        resource: Resource,
        records: Vec<Record>,
    ) -> Result<Vec<Outcome>, AdsError>;

    async fn update(
        &self,
        scope: &Scope,
        resource: Resource,
        records: Vec<Record>,
    ) -> Result<Vec<Outcome>, AdsError>;

    /// Archives an entity. Only resources marked archivable support it.
    async fn destroy(
        &self,
        scope: &Scope,
        resource: Resource,
        key: &EntityKey,
    ) -> Result<Outcome, AdsError>;
}
