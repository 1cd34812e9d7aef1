use super::{DocKey, DocumentStore, StoreError, metadata, with_metadata};
use crate::filter::Filter;
use crate::query::Page;
use amazon_ads::Record;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Process-local store. Documents are ordered by entity key within each
/// (resource, profile) pair, which gives `find` the same ordering as the
/// database backend.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<(String, String, String), Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(key: &DocKey) -> (String, String, String) {
        (key.key.clone(), key.path.clone(), key.profile_id.clone())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, filter: &Filter, page: Page) -> Result<Vec<Record>, StoreError> {
        let documents = self.documents.read().unwrap_or_else(|e| e.into_inner());
        let matching = documents
            .values()
            .filter(|record| filter.matches(record))
            .skip(page.skip as usize)
            .take(page.limit.map_or(usize::MAX, |l| l as usize))
            .cloned()
            .collect();
        Ok(matching)
    }

    async fn find_one(&self, filter: &Filter) -> Result<Option<Record>, StoreError> {
        let documents = self.documents.read().unwrap_or_else(|e| e.into_inner());
        Ok(documents.values().find(|r| filter.matches(r)).cloned())
    }

    async fn replace(&self, key: &DocKey, record: Record) -> Result<(), StoreError> {
        let mut documents = self.documents.write().unwrap_or_else(|e| e.into_inner());
        documents.insert(Self::slot(key), with_metadata(key, record));
        Ok(())
    }

    async fn merge(&self, key: &DocKey, fields: Record) -> Result<bool, StoreError> {
        let mut documents = self.documents.write().unwrap_or_else(|e| e.into_inner());
        let Some(document) = documents.get_mut(&Self::slot(key)) else {
            return Ok(false);
        };
        document.extend(fields);
        document.extend(metadata(key));
        Ok(true)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
