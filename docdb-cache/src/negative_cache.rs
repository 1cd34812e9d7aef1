// Short-lived record of entities the vendor recently reported as missing, so
// repeated lookups for them do not reach the vendor.
use crate::metrics_defs::{NEGATIVE_CACHE_HIT, NEGATIVE_CACHE_MISS};
use crate::store::DocKey;
use moka::sync::Cache;
use shared::counter;
use std::time::Duration;

pub struct NegativeCache {
    cache: Cache<DocKey, ()>,
}

impl NegativeCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        NegativeCache { cache }
    }

    pub fn insert(&self, key: &DocKey) {
        self.cache.insert(key.clone(), ());
    }

    pub fn remove(&self, key: &DocKey) {
        self.cache.invalidate(key);
    }

    pub fn contains(&self, key: &DocKey) -> bool {
        let cache_hit = self.cache.contains_key(key);
        let metric_def = if cache_hit {
            NEGATIVE_CACHE_HIT
        } else {
            NEGATIVE_CACHE_MISS
        };
        counter!(metric_def).increment(1);
        cache_hit
    }
}
