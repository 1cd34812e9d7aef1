use crate::metrics_defs::{
    CACHE_BYPASS, CACHE_HIT, CACHE_MISS, CACHE_READ_ERROR, CACHE_WRITE_BACK, CACHE_WRITE_ERROR,
};
use crate::negative_cache::NegativeCache;
use crate::query::{QueryRewriter, RewrittenQuery, is_live, listing_params, vendor_params};
use crate::store::{DocKey, DocumentStore, StoreError, scope_filter, strip_metadata};
use amazon_ads::{AdsApi, AdsError, Api, EntityKey, Outcome, QueryParams, Record, Resource, Scope};
use async_trait::async_trait;
use serde_json::Value;
use shared::counter;
use std::sync::Arc;

/// Cache-aside wrapper around a vendor [`AdsApi`].
///
/// Lists are answered from the document store once the full vendor listing
/// of a resource has been stored for the profile; until then they go to the
/// vendor, which fills the store. Single entities are cached as they are
/// read or created. Writes always go to the vendor first and successful
/// results are mirrored into the store, but only ever into documents that
/// already exist or were fully returned by the vendor. The store is
/// best-effort: read failures fall back to the vendor and write-back
/// failures are logged, never returned.
pub struct CachedAdsApi {
    vendor: Arc<dyn AdsApi>,
    store: Arc<dyn DocumentStore>,
    negative_cache: NegativeCache,
}

impl CachedAdsApi {
    pub fn new(
        vendor: Arc<dyn AdsApi>,
        store: Arc<dyn DocumentStore>,
        negative_cache: NegativeCache,
    ) -> Self {
        CachedAdsApi {
            vendor,
            store,
            negative_cache,
        }
    }

    fn read_failed(&self, resource: Resource, error: &StoreError) {
        tracing::warn!(%resource, error = %error, "store read failed, using vendor");
        counter!(CACHE_READ_ERROR).increment(1);
    }

    /// Canonicalizes a full vendor record in place and stores it, replacing
    /// whatever was cached for it. Returns the record's key, if it has one.
    async fn write_back(
        &self,
        scope: &Scope,
        resource: Resource,
        record: &mut Record,
    ) -> Option<EntityKey> {
        let key = self.prepare(resource, record)?;
        let doc_key = DocKey::new(resource.slug(), &scope.profile_id, &key);
        let result = self.store.replace(&doc_key, record.clone()).await;
        self.wrote_back(resource, "replace", &doc_key, result.map(|()| true));
        Some(key)
    }

    async fn write_back_all(&self, scope: &Scope, resource: Resource, records: &[Record]) {
        for record in records {
            self.write_back(scope, resource, &mut record.clone()).await;
        }
    }

    /// Sets the given fields on the cached entity they identify. Entities
    /// that are not cached stay uncached: a fragment is not a vendor record.
    async fn write_back_fields(&self, scope: &Scope, resource: Resource, mut fields: Record) {
        let Some(key) = self.prepare(resource, &mut fields) else {
            return;
        };
        let doc_key = DocKey::new(resource.slug(), &scope.profile_id, &key);
        let result = self.store.merge(&doc_key, fields).await;
        self.wrote_back(resource, "merge", &doc_key, result);
    }

    fn prepare(&self, resource: Resource, record: &mut Record) -> Option<EntityKey> {
        match EntityKey::from_record(resource, record) {
            Ok(key) => {
                key.normalize(record);
                canonicalize_state(resource.api(), record);
                Some(key)
            }
            Err(e) => {
                tracing::warn!(%resource, error = %e, "vendor record has no usable key, not caching");
                counter!(CACHE_WRITE_ERROR).increment(1);
                None
            }
        }
    }

    fn wrote_back(
        &self,
        resource: Resource,
        op: &'static str,
        doc_key: &DocKey,
        result: Result<bool, StoreError>,
    ) {
        match result {
            Ok(stored) => {
                // The vendor knows the entity either way.
                self.negative_cache.remove(doc_key);
                if stored {
                    counter!(CACHE_WRITE_BACK, "resource" => resource.slug(), "op" => op)
                        .increment(1);
                } else {
                    tracing::debug!(%resource, key = %doc_key.key, "entity not cached, skipping write-back");
                }
            }
            Err(e) => {
                tracing::error!(%resource, key = %doc_key.key, error = %e, "cache write-back failed");
                counter!(CACHE_WRITE_ERROR).increment(1);
            }
        }
    }

    async fn mark_listed(&self, scope: &Scope, resource: Resource) {
        if let Err(e) = self
            .store
            .mark_listed(resource.slug(), &scope.profile_id)
            .await
        {
            tracing::error!(%resource, error = %e, "could not mark listing as stored");
            counter!(CACHE_WRITE_ERROR).increment(1);
        }
    }

    /// Fetches the whole listing from the vendor, stores it, and answers the
    /// query from it in memory with the same filter, order and page the
    /// store would apply.
    async fn fetch_listing(
        &self,
        scope: &Scope,
        resource: Resource,
        params: &QueryParams,
        query: &RewrittenQuery,
    ) -> Result<Vec<Record>, AdsError> {
        let listing = listing_params(params);
        let records = self.vendor.index(scope, resource, &listing).await?;

        let mut keyed = Vec::with_capacity(records.len());
        for mut record in records {
            let key = self.write_back(scope, resource, &mut record).await;
            keyed.push((key.map(|k| k.to_string()), record));
        }
        // Unrecognized parameters may have narrowed the vendor listing.
        if listing.is_empty() {
            self.mark_listed(scope, resource).await;
        }

        keyed.retain(|(_, record)| query.filter.as_ref().is_none_or(|f| f.matches(record)));
        // Stored documents are ordered by key; records without one go last.
        keyed.sort_by(|(a, _), (b, _)| match (a, b) {
            (Some(a), Some(b)) => a.cmp(b),
            (a, b) => b.is_some().cmp(&a.is_some()),
        });

        Ok(query
            .page
            .apply(keyed.into_iter().map(|(_, record)| record).collect()))
    }
}

/// Sponsored Ads states are stored lower-case, DSP statuses upper-case, so
/// that state filters can match exactly.
fn canonicalize_state(api: Api, record: &mut Record) {
    let (field, upper) = match api {
        Api::SponsoredAds => ("state", false),
        Api::Dsp => ("status", true),
    };
    if let Some(Value::String(state)) = record.get_mut(field) {
        *state = if upper {
            state.to_uppercase()
        } else {
            state.to_lowercase()
        };
    }
}

/// Submitted records whose outcome succeeded, completed with the fields the
/// vendor returned for them (such as an assigned id). Outcomes line up with
/// the submitted records by position.
fn succeeded(submitted: Vec<Record>, outcomes: &[Outcome]) -> impl Iterator<Item = Record> + '_ {
    submitted
        .into_iter()
        .zip(outcomes)
        .filter(|(_, outcome)| outcome.is_success())
        .map(|(mut record, outcome)| {
            record.extend(outcome.fields.clone());
            record
        })
}

#[async_trait]
impl AdsApi for CachedAdsApi {
    async fn index(
        &self,
        scope: &Scope,
        resource: Resource,
        params: &QueryParams,
    ) -> Result<Vec<Record>, AdsError> {
        if is_live(params) {
            counter!(CACHE_BYPASS, "resource" => resource.slug()).increment(1);
            let forwarded = vendor_params(params);
            let records = self.vendor.index(scope, resource, &forwarded).await?;
            self.write_back_all(scope, resource, &records).await;
            if forwarded.is_empty() {
                self.mark_listed(scope, resource).await;
            }
            return Ok(records);
        }

        let query = QueryRewriter::rewrite(resource, params)?;

        match self.store.is_listed(resource.slug(), &scope.profile_id).await {
            Ok(true) => {
                let mut filter = scope_filter(resource.slug(), &scope.profile_id);
                if let Some(rewritten) = &query.filter {
                    filter = filter.and(rewritten.clone());
                }
                match self.store.find(&filter, query.page).await {
                    Ok(documents) => {
                        counter!(CACHE_HIT, "resource" => resource.slug(), "op" => "index")
                            .increment(1);
                        return Ok(documents.into_iter().map(strip_metadata).collect());
                    }
                    Err(e) => self.read_failed(resource, &e),
                }
            }
            Ok(false) => {}
            Err(e) => self.read_failed(resource, &e),
        }

        counter!(CACHE_MISS, "resource" => resource.slug(), "op" => "index").increment(1);
        self.fetch_listing(scope, resource, params, &query).await
    }

    async fn show(
        &self,
        scope: &Scope,
        resource: Resource,
        key: &EntityKey,
        params: &QueryParams,
    ) -> Result<Option<Record>, AdsError> {
        let doc_key = DocKey::new(resource.slug(), &scope.profile_id, key);
        let forwarded = vendor_params(params);

        if is_live(params) {
            counter!(CACHE_BYPASS, "resource" => resource.slug()).increment(1);
        } else {
            match self.store.find_one(&doc_key.filter()).await {
                Ok(Some(document)) => {
                    counter!(CACHE_HIT, "resource" => resource.slug(), "op" => "show")
                        .increment(1);
                    return Ok(Some(strip_metadata(document)));
                }
                Ok(None) => {}
                Err(e) => self.read_failed(resource, &e),
            }

            if self.negative_cache.contains(&doc_key) {
                return Ok(None);
            }
            counter!(CACHE_MISS, "resource" => resource.slug(), "op" => "show").increment(1);
        }

        match self.vendor.show(scope, resource, key, &forwarded).await? {
            Some(record) => {
                self.write_back_all(scope, resource, std::slice::from_ref(&record))
                    .await;
                Ok(Some(record))
            }
            None => {
                self.negative_cache.insert(&doc_key);
                Ok(None)
            }
        }
    }

    async fn create(
        &self,
        scope: &Scope,
        resource: Resource,
        records: Vec<Record>,
    ) -> Result<Vec<Outcome>, AdsError> {
        let outcomes = self
            .vendor
            .create(scope, resource, records.clone())
            .await?;
        for mut record in succeeded(records, &outcomes) {
            self.write_back(scope, resource, &mut record).await;
        }
        Ok(outcomes)
    }

    async fn update(
        &self,
        scope: &Scope,
        resource: Resource,
        records: Vec<Record>,
    ) -> Result<Vec<Outcome>, AdsError> {
        let outcomes = self
            .vendor
            .update(scope, resource, records.clone())
            .await?;
        for fields in succeeded(records, &outcomes) {
            self.write_back_fields(scope, resource, fields).await;
        }
        Ok(outcomes)
    }

    async fn destroy(
        &self,
        scope: &Scope,
        resource: Resource,
        key: &EntityKey,
    ) -> Result<Outcome, AdsError> {
        let outcome = self.vendor.destroy(scope, resource, key).await?;

        if outcome.is_success() {
            let mut fields = Record::new();
            key.normalize(&mut fields);
            fields.insert("state".into(), Value::String("archived".into()));
            self.write_back_fields(scope, resource, fields).await;
        }

        Ok(outcome)
    }
}
