//! Storage backends for cached vendor entities. Every backend keeps one
//! document per (resource, profile, entity key) and tags it with the
//! metadata fields below so it can be found again.

use crate::filter::Filter;
use crate::query::Page;
use amazon_ads::Record;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

pub const PATH_FIELD: &str = "_path";
pub const PROFILE_FIELD: &str = "_profileId";
pub const KEY_FIELD: &str = "_key";
pub const SYNCED_AT_FIELD: &str = "_syncedAt";

/// Appended to a resource path to name its listing marker. The marker
/// records that the full vendor listing for one profile has been stored.
const LISTING_SUFFIX: &str = "#listing";

const METADATA_FIELDS: &[&str] = &["_id", PATH_FIELD, PROFILE_FIELD, KEY_FIELD, SYNCED_AT_FIELD];

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("could not encode document: {0}")]
    Encode(#[from] mongodb::bson::ser::Error),

    #[error("could not decode document: {0}")]
    Decode(#[from] mongodb::bson::de::Error),
}

/// Identity of one cached document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocKey {
    pub path: String,
    pub profile_id: String,
    pub key: String,
}

impl DocKey {
    pub fn new(path: &str, profile_id: &str, key: impl ToString) -> Self {
        DocKey {
            path: path.to_string(),
            profile_id: profile_id.to_string(),
            key: key.to_string(),
        }
    }

    /// Key of the listing marker for one resource within one profile. Its
    /// path never equals a resource slug, so scope filters do not see it.
    pub fn listing(path: &str, profile_id: &str) -> Self {
        DocKey::new(&format!("{path}{LISTING_SUFFIX}"), profile_id, "")
    }

    pub fn filter(&self) -> Filter {
        scope_filter(&self.path, &self.profile_id).and(Filter::eq(KEY_FIELD, self.key.as_str()))
    }
}

/// Filter selecting every document of one resource within one profile.
pub fn scope_filter(path: &str, profile_id: &str) -> Filter {
    Filter::And(vec![
        Filter::eq(PATH_FIELD, path),
        Filter::eq(PROFILE_FIELD, profile_id),
    ])
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Documents matching `filter`, ordered by entity key.
    async fn find(&self, filter: &Filter, page: Page) -> Result<Vec<Record>, StoreError>;

    async fn find_one(&self, filter: &Filter) -> Result<Option<Record>, StoreError>;

    /// Inserts or fully replaces the document for `key`.
    async fn replace(&self, key: &DocKey, record: Record) -> Result<(), StoreError>;

    /// Sets the given fields on an existing document for `key`. Returns
    /// `false`, and stores nothing, when no such document exists.
    async fn merge(&self, key: &DocKey, fields: Record) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    /// Records that every entity of `path` in `profile_id` has been stored.
    async fn mark_listed(&self, path: &str, profile_id: &str) -> Result<(), StoreError> {
        self.replace(&DocKey::listing(path, profile_id), Record::new())
            .await
    }

    /// Whether [`DocumentStore::mark_listed`] was called for this pair.
    async fn is_listed(&self, path: &str, profile_id: &str) -> Result<bool, StoreError> {
        let marker = DocKey::listing(path, profile_id);
        Ok(self.find_one(&marker.filter()).await?.is_some())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Metadata fields written alongside every record.
pub(crate) fn metadata(key: &DocKey) -> Record {
    let mut fields = Record::new();
    fields.insert(PATH_FIELD.into(), Value::String(key.path.clone()));
    fields.insert(PROFILE_FIELD.into(), Value::String(key.profile_id.clone()));
    fields.insert(KEY_FIELD.into(), Value::String(key.key.clone()));
    fields.insert(SYNCED_AT_FIELD.into(), Value::String(now()));
    fields
}

pub(crate) fn with_metadata(key: &DocKey, mut record: Record) -> Record {
    record.retain(|field, _| !METADATA_FIELDS.contains(&field.as_str()));
    record.extend(metadata(key));
    record
}

/// Removes storage metadata before a document is handed back to callers.
pub fn strip_metadata(mut record: Record) -> Record {
    record.retain(|field, _| !METADATA_FIELDS.contains(&field.as_str()));
    record
}
