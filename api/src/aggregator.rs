use crate::metrics_defs::{METRICS_BATCH_DURATION, METRICS_BATCH_FAILED};
use crate::performance::{MetricsError, MetricsSource, Totals};
use amazon_ads::{Record, Resource};
use docdb_cache::DateRange;
use serde_json::Value;
use shared::{counter, histogram};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

pub const PERFORMANCE_FIELD: &str = "performance";

/// Decorates listed entities with their performance totals.
pub struct Aggregator {
    source: Arc<dyn MetricsSource>,
    batch_size: usize,
}

fn entity_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Aggregator {
    pub fn new(source: Arc<dyn MetricsSource>, batch_size: usize) -> Self {
        Aggregator {
            source,
            batch_size: batch_size.max(1),
        }
    }

    /// Looks up totals for every record in batches of at most `batch_size`
    /// ids, run concurrently, and stores them under [`PERFORMANCE_FIELD`].
    /// Records without data get zeros. Fails if any batch fails.
    pub async fn attach_performance(
        &self,
        records: &mut [Record],
        resource: Resource,
        range: DateRange,
        profile_id: &str,
    ) -> Result<(), MetricsError> {
        let id_field = resource.primary_id_field();
        let api = resource.api();

        let mut seen = HashSet::new();
        let ids: Vec<String> = records
            .iter()
            .filter_map(|record| record.get(id_field).and_then(entity_id))
            .filter(|id| seen.insert(id.clone()))
            .collect();

        let mut join_set = JoinSet::new();
        for batch in ids.chunks(self.batch_size) {
            let source = self.source.clone();
            let batch = batch.to_vec();
            let profile_id = profile_id.to_string();

            join_set.spawn(async move {
                let started = Instant::now();
                let result = source
                    .totals(api, id_field, &profile_id, &batch, range)
                    .await;
                histogram!(METRICS_BATCH_DURATION).record(started.elapsed().as_secs_f64());
                result
            });
        }

        let mut totals: HashMap<String, Totals> = HashMap::with_capacity(ids.len());
        while let Some(joined) = join_set.join_next().await {
            let result = joined.map_err(|e| MetricsError::Task(e.to_string()))?;
            match result {
                Ok(batch_totals) => totals.extend(batch_totals),
                Err(e) => {
                    counter!(METRICS_BATCH_FAILED).increment(1);
                    tracing::error!(%resource, error = %e, "performance batch failed");
                    join_set.abort_all();
                    return Err(e);
                }
            }
        }

        for record in records.iter_mut() {
            let entity_totals = record
                .get(id_field)
                .and_then(entity_id)
                .and_then(|id| totals.get(&id).copied())
                .unwrap_or_default();
            record.insert(PERFORMANCE_FIELD.to_string(), entity_totals.to_json());
        }

        tracing::debug!(
            %resource,
            entities = ids.len(),
            batches = ids.len().div_ceil(self.batch_size),
            "attached performance"
        );

        Ok(())
    }
}
