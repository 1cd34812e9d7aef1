//! Advertising performance totals and the search backend they come from.

use crate::config::SearchConfig;
use amazon_ads::Api;
use async_trait::async_trait;
use docdb_cache::DateRange;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum MetricsError {
    #[error("search request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid search URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("search returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("metrics task failed: {0}")]
    Task(String),
}

/// Summed delivery figures for one entity over a date range.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Totals {
    pub impressions: f64,
    pub clicks: f64,
    pub cost: f64,
    pub sales: f64,
    pub orders: f64,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

impl Totals {
    /// Totals plus derived ratios, as attached to API records.
    pub fn to_json(&self) -> Value {
        json!({
            "impressions": self.impressions as u64,
            "clicks": self.clicks as u64,
            "cost": self.cost,
            "sales": self.sales,
            "orders": self.orders as u64,
            "ctr": ratio(self.clicks, self.impressions),
            "cpc": ratio(self.cost, self.clicks),
            "acos": ratio(self.cost, self.sales),
            "roas": ratio(self.sales, self.cost),
        })
    }
}

/// Source of per-entity performance totals.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Totals for each of `ids`, keyed by id. Ids without any data may be
    /// left out of the result.
    async fn totals(
        &self,
        api: Api,
        id_field: &str,
        profile_id: &str,
        ids: &[String],
        range: DateRange,
    ) -> Result<HashMap<String, Totals>, MetricsError>;
}

const SUMMED_FIELDS: &[&str] = &["impressions", "clicks", "cost", "sales", "orders"];

#[derive(Deserialize)]
struct SearchResponse {
    aggregations: Aggregations,
}

#[derive(Deserialize)]
struct Aggregations {
    entities: EntityBuckets,
}

#[derive(Deserialize)]
struct EntityBuckets {
    buckets: Vec<Bucket>,
}

#[derive(Deserialize)]
struct Bucket {
    key: Value,
    #[serde(flatten)]
    sums: HashMap<String, Value>,
}

impl Bucket {
    fn sum(&self, field: &str) -> f64 {
        self.sums
            .get(field)
            .and_then(|agg| agg.get("value"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }
}

/// Reads daily performance rows from Elasticsearch and sums them per entity.
pub struct ElasticsearchMetrics {
    client: reqwest::Client,
    url: Url,
    index_prefix: String,
}

impl ElasticsearchMetrics {
    pub fn new(config: &SearchConfig) -> Result<Self, MetricsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(ElasticsearchMetrics {
            client,
            url: config.url.clone(),
            index_prefix: config.index_prefix.clone(),
        })
    }

    fn search_url(&self, api: Api) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "{}/{}-{}/_search",
            self.url.as_str().trim_end_matches('/'),
            self.index_prefix,
            api.as_str()
        ))
    }

    fn query(id_field: &str, profile_id: &str, ids: &[String], range: DateRange) -> Value {
        let mut filters = vec![
            json!({ "term": { "profileId": profile_id } }),
            json!({ "terms": { (id_field): ids } }),
        ];

        let mut bounds = serde_json::Map::new();
        if let Some(start) = range.start {
            bounds.insert("gte".into(), json!(start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = range.end {
            bounds.insert("lte".into(), json!(end.format("%Y-%m-%d").to_string()));
        }
        if !bounds.is_empty() {
            bounds.insert("format".into(), json!("yyyy-MM-dd"));
            filters.push(json!({ "range": { "date": bounds } }));
        }

        let sums: serde_json::Map<String, Value> = SUMMED_FIELDS
            .iter()
            .map(|field| (field.to_string(), json!({ "sum": { "field": field } })))
            .collect();

        json!({
            "size": 0,
            "query": { "bool": { "filter": filters } },
            "aggs": {
                "entities": {
                    "terms": { "field": id_field, "size": ids.len() },
                    "aggs": sums,
                }
            }
        })
    }
}

fn bucket_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl MetricsSource for ElasticsearchMetrics {
    async fn totals(
        &self,
        api: Api,
        id_field: &str,
        profile_id: &str,
        ids: &[String],
        range: DateRange,
    ) -> Result<HashMap<String, Totals>, MetricsError> {
        let response = self
            .client
            .post(self.search_url(api)?)
            .json(&Self::query(id_field, profile_id, ids, range))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MetricsError::Status { status, body });
        }

        let response = response.json::<SearchResponse>().await?;

        Ok(response
            .aggregations
            .entities
            .buckets
            .iter()
            .map(|bucket| {
                let totals = Totals {
                    impressions: bucket.sum("impressions"),
                    clicks: bucket.sum("clicks"),
                    cost: bucket.sum("cost"),
                    sales: bucket.sum("sales"),
                    orders: bucket.sum("orders"),
                };
                (bucket_key(&bucket.key), totals)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Json, Path, State};
    use axum::routing::post;
    use axum::Router;
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<(String, Value)>>>;

    async fn spawn_search(status: axum::http::StatusCode) -> (Url, Captured) {
        let captured: Captured = Arc::default();

        let app = Router::new()
            .route(
                "/{index}/_search",
                post(
                    move |State(captured): State<Captured>,
                          Path(index): Path<String>,
                          Json(body): Json<Value>| async move {
                        captured.lock().unwrap().push((index, body));
                        let response = json!({
                            "aggregations": { "entities": { "buckets": [
                                {
                                    "key": 1,
                                    "doc_count": 3,
                                    "impressions": { "value": 1000.0 },
                                    "clicks": { "value": 50.0 },
                                    "cost": { "value": 25.0 },
                                    "sales": { "value": 100.0 },
                                    "orders": { "value": 4.0 },
                                },
                                { "key": "li-2", "doc_count": 1, "impressions": { "value": 10.0 } },
                            ] } }
                        });
                        (status, Json(response))
                    },
                ),
            )
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        (Url::parse(&format!("http://{addr}/")).unwrap(), captured)
    }

    fn metrics(url: Url) -> ElasticsearchMetrics {
        ElasticsearchMetrics::new(&SearchConfig {
            url,
            index_prefix: "perf".into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_ratios() {
        let performance = Totals {
            impressions: 1000.0,
            clicks: 50.0,
            cost: 25.0,
            sales: 100.0,
            orders: 4.0,
        }
        .to_json();
        assert_eq!(performance["ctr"], json!(0.05));
        assert_eq!(performance["cpc"], json!(0.5));
        assert_eq!(performance["acos"], json!(0.25));
        assert_eq!(performance["roas"], json!(4.0));
        assert_eq!(performance["impressions"], json!(1000));

        let empty = Totals::default().to_json();
        for field in ["ctr", "cpc", "acos", "roas"] {
            assert_eq!(empty[field], json!(0.0));
        }
    }

    #[tokio::test]
    async fn test_search_query_and_parse() {
        let (url, captured) = spawn_search(axum::http::StatusCode::OK).await;
        let source = metrics(url);

        let range = DateRange::from_params(
            &[
                ("startDate".to_string(), "20240301".to_string()),
                ("endDate".to_string(), "20240331".to_string()),
            ]
            .into(),
        )
        .unwrap();
        let totals = source
            .totals(
                Api::SponsoredAds,
                "campaignId",
                "p1",
                &["1".to_string(), "2".to_string()],
                range,
            )
            .await
            .unwrap();

        assert_eq!(totals["1"].clicks, 50.0);
        assert_eq!(totals["li-2"].impressions, 10.0);
        assert_eq!(totals["li-2"].cost, 0.0);

        let (index, body) = captured.lock().unwrap()[0].clone();
        assert_eq!(index, "perf-sa");
        assert_eq!(
            body["query"]["bool"]["filter"][1],
            json!({ "terms": { "campaignId": ["1", "2"] } })
        );
        assert_eq!(
            body["query"]["bool"]["filter"][2]["range"]["date"]["gte"],
            json!("2024-03-01")
        );
        assert_eq!(body["aggs"]["entities"]["terms"]["size"], json!(2));
        assert_eq!(
            body["aggs"]["entities"]["aggs"]["cost"],
            json!({ "sum": { "field": "cost" } })
        );
    }

    #[tokio::test]
    async fn test_search_error_status() {
        let (url, _) = spawn_search(axum::http::StatusCode::SERVICE_UNAVAILABLE).await;
        let result = metrics(url)
            .totals(Api::Dsp, "orderId", "p1", &["o-1".to_string()], DateRange::default())
            .await;
        assert!(matches!(result, Err(MetricsError::Status { .. })));
    }
}
