use crate::auth::TokenProvider;
use crate::config::Config;
use crate::errors::AdsError;
use crate::key::EntityKey;
use crate::metrics_defs::{VENDOR_REQUEST_DURATION, VENDOR_RETRY};
use crate::resource::{Api, Resource};
use crate::{AdsApi, Outcome, QueryParams, Record, Scope};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use shared::{counter, histogram};
use std::time::Instant;
use tokio::time::{Duration, sleep};
use url::Url;

pub const SCOPE_HEADER: &str = "Amazon-Advertising-API-Scope";
pub const CLIENT_ID_HEADER: &str = "Amazon-Advertising-API-ClientId";

const RETRIABLE_STATUS_CODES: &[StatusCode] = &[
    StatusCode::TOO_MANY_REQUESTS,     // 429
    StatusCode::INTERNAL_SERVER_ERROR, // 500
    StatusCode::BAD_GATEWAY,           // 502
    StatusCode::SERVICE_UNAVAILABLE,   // 503
    StatusCode::GATEWAY_TIMEOUT,       // 504
];

/// DSP list responses wrap the page in an envelope.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DspPage {
    total_results: Option<u64>,
    #[serde(default)]
    response: Vec<Value>,
}

/// HTTP client for the Amazon Advertising APIs.
pub struct AdsClient {
    client: reqwest::Client,
    base_url: Url,
    client_id: String,
    tokens: TokenProvider,
    max_retries: u32,
    retry_base_delay_ms: u64,
    page_size: u32,
}

impl AdsClient {
    pub fn new(config: &Config) -> Result<Self, AdsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let tokens = TokenProvider::new(
            client.clone(),
            config.token_url()?,
            config.client_id.clone(),
            config.client_secret.clone(),
            config.refresh_token.clone(),
        );

        Ok(AdsClient {
            client,
            base_url: config.api_url()?,
            client_id: config.client_id.clone(),
            tokens,
            max_retries: config.max_retries,
            retry_base_delay_ms: config.retry_base_delay_ms,
            page_size: config.page_size,
        })
    }

    fn collection_url(&self, resource: Resource) -> Result<Url, AdsError> {
        Ok(self.base_url.join(resource.endpoint().path)?)
    }

    /// Entity URL with every key part percent-encoded as one path segment,
    /// so ids cannot add segments or a query string.
    fn entity_url(&self, resource: Resource, key: &EntityKey) -> Result<Url, AdsError> {
        let mut entity = self.collection_url(resource)?;
        entity
            .path_segments_mut()
            .map_err(|()| AdsError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(key.path_segments());
        Ok(entity)
    }

    /// Sends one vendor request, retrying retriable statuses with exponential
    /// backoff. A rejected access token is refreshed once. Returns `None` on
    /// 404 and `Value::Null` for an empty body.
    async fn send(
        &self,
        scope: &Scope,
        method: Method,
        url: Url,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>, AdsError> {
        let mut retries = 0;
        let mut reauthenticated = false;

        loop {
            let token = self.tokens.access_token().await?;

            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .bearer_auth(&token)
                .header(CLIENT_ID_HEADER, &self.client_id)
                .header(SCOPE_HEADER, &scope.profile_id)
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            let started = Instant::now();
            let response = request.send().await?;
            let status = response.status();
            histogram!(VENDOR_REQUEST_DURATION,
                "method" => method.to_string(),
                "status" => status.as_u16().to_string()
            )
            .record(started.elapsed().as_secs_f64());

            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            if status == StatusCode::UNAUTHORIZED && !reauthenticated {
                tracing::info!(%url, "access token rejected, refreshing");
                self.tokens.invalidate().await;
                reauthenticated = true;
                continue;
            }

            if !status.is_success() {
                if RETRIABLE_STATUS_CODES.contains(&status) {
                    if retries < self.max_retries {
                        let retry_millis = backoff_millis(self.retry_base_delay_ms, retries);
                        tracing::warn!(%url, %status, retries, "retrying vendor request");
                        counter!(VENDOR_RETRY).increment(1);
                        sleep(Duration::from_millis(retry_millis)).await;
                        retries += 1;
                        continue;
                    }
                    return Err(AdsError::RetriesExceeded(retries));
                }

                let body = response.text().await.unwrap_or_default();
                return Err(AdsError::Status { status, body });
            }

            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                return Ok(Some(Value::Null));
            }

            return serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| AdsError::UnexpectedResponse(e.to_string()));
        }
    }

    async fn fetch_page(
        &self,
        scope: &Scope,
        resource: Resource,
        query: &[(&str, String)],
    ) -> Result<(Vec<Record>, Option<u64>), AdsError> {
        let body = found(
            self.send(scope, Method::GET, self.collection_url(resource)?, query, None)
                .await?,
        )?;

        match resource.api() {
            Api::SponsoredAds => Ok((into_records(body)?, None)),
            Api::Dsp => {
                let page: DspPage = serde_json::from_value(body)
                    .map_err(|e| AdsError::UnexpectedResponse(e.to_string()))?;
                Ok((into_records(Value::Array(page.response))?, page.total_results))
            }
        }
    }

    async fn write(
        &self,
        scope: &Scope,
        method: Method,
        resource: Resource,
        records: Vec<Record>,
    ) -> Result<Vec<Outcome>, AdsError> {
        let body = Value::Array(records.into_iter().map(Value::Object).collect());
        let response = found(
            self.send(scope, method, self.collection_url(resource)?, &[], Some(&body))
                .await?,
        )?;

        match response {
            Value::Object(record) => Ok(vec![Outcome::from_record(record)]),
            other => Ok(into_records(other)?
                .into_iter()
                .map(Outcome::from_record)
                .collect()),
        }
    }
}

fn found(value: Option<Value>) -> Result<Value, AdsError> {
    value.ok_or(AdsError::Status {
        status: StatusCode::NOT_FOUND,
        body: String::new(),
    })
}

fn into_records(value: Value) -> Result<Vec<Record>, AdsError> {
    let Value::Array(items) = value else {
        return Err(AdsError::UnexpectedResponse(
            "expected a JSON array".to_string(),
        ));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            other => Err(AdsError::UnexpectedResponse(format!(
                "expected an object, got {other}"
            ))),
        })
        .collect()
}

#[async_trait]
impl AdsApi for AdsClient {
    async fn index(
        &self,
        scope: &Scope,
        resource: Resource,
        params: &QueryParams,
    ) -> Result<Vec<Record>, AdsError> {
        // A caller asking for a specific page gets exactly that page.
        let explicit_page = params.contains_key("startIndex") || params.contains_key("count");
        let mut start_index: u64 = params
            .get("startIndex")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let count: u64 = params
            .get("count")
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.page_size as u64);

        let mut records = Vec::new();
        let mut page_fetches = 0;

        loop {
            let mut query: Vec<(&str, String)> = params
                .iter()
                .filter(|(k, _)| k.as_str() != "startIndex" && k.as_str() != "count")
                .map(|(k, v)| (k.as_str(), v.clone()))
                .collect();
            query.push(("startIndex", start_index.to_string()));
            query.push(("count", count.to_string()));

            let (page, total_results) = self.fetch_page(scope, resource, &query).await?;
            let page_len = page.len() as u64;
            records.extend(page);
            page_fetches += 1;

            if explicit_page || page_len < count {
                break;
            }
            if let Some(total) = total_results
                && records.len() as u64 >= total
            {
                break;
            }
            start_index += page_len;
        }

        tracing::debug!(%resource, page_fetches, records = records.len(), "listed from vendor");

        Ok(records)
    }

    async fn show(
        &self,
        scope: &Scope,
        resource: Resource,
        key: &EntityKey,
        params: &QueryParams,
    ) -> Result<Option<Record>, AdsError> {
        let url = self.entity_url(resource, key)?;
        let query: Vec<(&str, String)> = params
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();

        match self.send(scope, Method::GET, url, &query, None).await? {
            None => Ok(None),
            Some(Value::Object(record)) => Ok(Some(record)),
            Some(other) => Err(AdsError::UnexpectedResponse(format!(
                "expected an object, got {other}"
            ))),
        }
    }

    async fn create(
        &self,
        scope: &Scope,
        resource: Resource,
        records: Vec<Record>,
    ) -> Result<Vec<Outcome>, AdsError> {
        self.write(scope, Method::POST, resource, records).await
    }

    async fn update(
        &self,
        scope: &Scope,
        resource: Resource,
        records: Vec<Record>,
    ) -> Result<Vec<Outcome>, AdsError> {
        self.write(scope, Method::PUT, resource, records).await
    }

    async fn destroy(
        &self,
        scope: &Scope,
        resource: Resource,
        key: &EntityKey,
    ) -> Result<Outcome, AdsError> {
        if !resource.endpoint().archivable {
            return Err(AdsError::Unsupported(resource.slug()));
        }

        let url = self.entity_url(resource, key)?;
        match found(self.send(scope, Method::DELETE, url, &[], None).await?)? {
            Value::Object(record) => Ok(Outcome::from_record(record)),
            // Some endpoints answer with an empty body.
            Value::Null => {
                let mut fields = Record::new();
                key.normalize(&mut fields);
                Ok(Outcome::success(fields))
            }
            other => Err(AdsError::UnexpectedResponse(format!(
                "expected an object, got {other}"
            ))),
        }
    }
}

/// Exponential backoff that saturates for large retry counts.
fn backoff_millis(base_ms: u64, retries: u32) -> u64 {
    base_ms.saturating_mul(2_u64.saturating_pow(retries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::FakeAdsServer;
    use serde_json::json;

    fn scope() -> Scope {
        Scope::new("1234567890")
    }

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    fn seed_campaigns(server: &FakeAdsServer, n: i64) {
        let mut state = server.state();
        for id in 1..=n {
            state.campaigns.push(json!({
                "campaignId": id,
                "name": format!("campaign {id}"),
                "state": if id % 2 == 0 { "paused" } else { "enabled" },
            }));
        }
    }

    #[tokio::test]
    async fn test_entity_url_escapes_ids() {
        let server = FakeAdsServer::spawn().await;
        let client = AdsClient::new(&server.config()).unwrap();
        let url = |resource, raw| {
            client
                .entity_url(resource, &EntityKey::parse(resource, raw).unwrap())
                .unwrap()
        };

        let smuggled = url(Resource::DspOrders, "o-1?advertiserId=evil");
        assert_eq!(smuggled.path(), "/dsp/orders/o-1%3FadvertiserId=evil");
        assert_eq!(smuggled.query(), None);

        assert_eq!(url(Resource::DspOrders, "a/b#c").path(), "/dsp/orders/a%2Fb%23c");
        assert_eq!(url(Resource::DspOrders, "%2E%2E").path(), "/dsp/orders/%252E%252E");
        assert_eq!(
            url(Resource::DspLineItemCreatives, "li-1:cr-9").path(),
            "/dsp/lineItemCreativeAssociations/li-1/cr-9"
        );
        assert_eq!(url(Resource::SpCampaigns, "42").path(), "/v2/sp/campaigns/42");
    }

    #[tokio::test]
    async fn test_index_follows_sponsored_ads_pages() {
        let server = FakeAdsServer::spawn().await;
        seed_campaigns(&server, 5);
        let client = AdsClient::new(&server.config()).unwrap();

        let records = client
            .index(&scope(), Resource::SpCampaigns, &QueryParams::new())
            .await
            .unwrap();

        assert_eq!(records.len(), 5);
        assert_eq!(records[4]["campaignId"], json!(5));
        // page_size is 2: pages of 2, 2 and 1
        assert_eq!(server.state().list_requests, 3);
        assert_eq!(server.state().last_scope.as_deref(), Some("1234567890"));
    }

    #[tokio::test]
    async fn test_index_explicit_page_and_filters() {
        let server = FakeAdsServer::spawn().await;
        seed_campaigns(&server, 5);
        let client = AdsClient::new(&server.config()).unwrap();

        let params = QueryParams::from([
            ("startIndex".to_string(), "1".to_string()),
            ("count".to_string(), "2".to_string()),
        ]);
        let records = client
            .index(&scope(), Resource::SpCampaigns, &params)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["campaignId"], json!(2));
        assert_eq!(server.state().list_requests, 1);

        let params = QueryParams::from([("stateFilter".to_string(), "enabled".to_string())]);
        let records = client
            .index(&scope(), Resource::SpCampaigns, &params)
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_index_unwraps_dsp_envelope() {
        let server = FakeAdsServer::spawn().await;
        {
            let mut state = server.state();
            for id in ["o-1", "o-2", "o-3", "o-4"] {
                state.orders.push(json!({"orderId": id, "status": "DELIVERING"}));
            }
        }
        let client = AdsClient::new(&server.config()).unwrap();

        let records = client
            .index(&scope(), Resource::DspOrders, &QueryParams::new())
            .await
            .unwrap();

        assert_eq!(records.len(), 4);
        // totalResults stops paging once everything arrived
        assert_eq!(server.state().list_requests, 2);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let server = FakeAdsServer::spawn().await;
        seed_campaigns(&server, 1);
        server.state().fail_next = 2;
        let client = AdsClient::new(&server.config()).unwrap();

        let records = client
            .index(&scope(), Resource::SpCampaigns, &QueryParams::new())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_backoff_saturates() {
        assert_eq!(backoff_millis(100, 0), 100);
        assert_eq!(backoff_millis(100, 3), 800);
        assert_eq!(backoff_millis(100, 64), u64::MAX);
        assert_eq!(backoff_millis(u64::MAX, 1), u64::MAX);
    }

    #[tokio::test]
    async fn test_retries_exceeded() {
        let server = FakeAdsServer::spawn().await;
        server.state().fail_next = 10;
        let client = AdsClient::new(&server.config()).unwrap();

        let result = client
            .index(&scope(), Resource::SpCampaigns, &QueryParams::new())
            .await;
        assert!(matches!(result, Err(AdsError::RetriesExceeded(2))));
    }

    #[tokio::test]
    async fn test_rejected_token_is_refreshed_once() {
        let server = FakeAdsServer::spawn().await;
        seed_campaigns(&server, 1);
        server.state().reject_token = Some("token-1".into());
        let client = AdsClient::new(&server.config()).unwrap();

        let records = client
            .index(&scope(), Resource::SpCampaigns, &QueryParams::new())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(server.state().token_refreshes, 2);
    }

    #[tokio::test]
    async fn test_show() {
        let server = FakeAdsServer::spawn().await;
        seed_campaigns(&server, 2);
        let client = AdsClient::new(&server.config()).unwrap();

        let key = EntityKey::parse(Resource::SpCampaigns, "2").unwrap();
        let record = client
            .show(&scope(), Resource::SpCampaigns, &key, &QueryParams::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record["name"], json!("campaign 2"));

        let key = EntityKey::parse(Resource::SpCampaigns, "99").unwrap();
        assert!(
            client
                .show(&scope(), Resource::SpCampaigns, &key, &QueryParams::new())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_create_and_update() {
        let server = FakeAdsServer::spawn().await;
        let client = AdsClient::new(&server.config()).unwrap();

        let outcomes = client
            .create(
                &scope(),
                Resource::SpCampaigns,
                vec![
                    record(json!({"name": "new", "state": "enabled"})),
                    record(json!({"state": "enabled"})),
                ],
            )
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_success());
        let id = outcomes[0].fields["campaignId"].clone();
        assert!(!outcomes[1].is_success());

        let outcomes = client
            .update(
                &scope(),
                Resource::SpCampaigns,
                vec![record(json!({"campaignId": id, "state": "paused"}))],
            )
            .await
            .unwrap();
        assert!(outcomes[0].is_success());
        assert_eq!(server.state().campaigns[0]["state"], json!("paused"));
        assert_eq!(server.state().campaigns[0]["name"], json!("new"));
    }

    #[tokio::test]
    async fn test_destroy() {
        let server = FakeAdsServer::spawn().await;
        seed_campaigns(&server, 1);
        let client = AdsClient::new(&server.config()).unwrap();

        let key = EntityKey::parse(Resource::SpCampaigns, "1").unwrap();
        let outcome = client
            .destroy(&scope(), Resource::SpCampaigns, &key)
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(server.state().campaigns[0]["state"], json!("archived"));

        let key = EntityKey::parse(Resource::SpCampaigns, "7").unwrap();
        assert!(matches!(
            client.destroy(&scope(), Resource::SpCampaigns, &key).await,
            Err(AdsError::Status {
                status: StatusCode::NOT_FOUND,
                ..
            })
        ));

        let key = EntityKey::parse(Resource::DspOrders, "o-1").unwrap();
        assert!(matches!(
            client.destroy(&scope(), Resource::DspOrders, &key).await,
            Err(AdsError::Unsupported("dsp/orders"))
        ));
    }
}
