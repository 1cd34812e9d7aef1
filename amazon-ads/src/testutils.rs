//! In-process stand-in for the Amazon Advertising API and its token
//! endpoint. Serves sp/campaigns and dsp/orders from shared state.

use crate::config::{Config, Region};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

pub struct FakeState {
    pub token_refreshes: u32,
    pub token_expires_in: u64,
    pub reject_refresh: bool,
    /// API calls made with this access token get a 401.
    pub reject_token: Option<String>,
    /// Number of upcoming API calls answered with a 503.
    pub fail_next: u32,
    pub list_requests: u32,
    pub last_scope: Option<String>,
    pub next_id: i64,
    pub campaigns: Vec<Value>,
    pub orders: Vec<Value>,
}

impl Default for FakeState {
    fn default() -> Self {
        FakeState {
            token_refreshes: 0,
            token_expires_in: 3600,
            reject_refresh: false,
            reject_token: None,
            fail_next: 0,
            list_requests: 0,
            last_scope: None,
            next_id: 1000,
            campaigns: Vec::new(),
            orders: Vec::new(),
        }
    }
}

type Shared = Arc<Mutex<FakeState>>;

pub struct FakeAdsServer {
    addr: SocketAddr,
    state: Shared,
}

impl FakeAdsServer {
    pub async fn spawn() -> Self {
        let state: Shared = Arc::default();

        let app = Router::new()
            .route("/auth/o2/token", post(token))
            .route(
                "/v2/sp/campaigns",
                get(list_campaigns)
                    .post(create_campaigns)
                    .put(update_campaigns),
            )
            .route(
                "/v2/sp/campaigns/{id}",
                get(show_campaign).delete(archive_campaign),
            )
            .route("/dsp/orders", get(list_orders))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        FakeAdsServer { addr, state }
    }

    pub fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://{}{}", self.addr, path)).unwrap()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn config(&self) -> Config {
        Config {
            region: Region::Na,
            client_id: "client".into(),
            client_secret: "secret".into(),
            refresh_token: "refresh".into(),
            api_url: Some(self.url("/")),
            token_url: Some(self.url("/auth/o2/token")),
            max_retries: 2,
            retry_base_delay_ms: 1,
            timeout_secs: 5,
            page_size: 2,
        }
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"code": status.as_u16().to_string(), "details": message}))).into_response()
}

/// Common checks for every API call: records the scope, applies injected
/// failures and rejects revoked tokens.
fn precheck(state: &mut FakeState, headers: &HeaderMap) -> Option<Response> {
    state.last_scope = headers
        .get("Amazon-Advertising-API-Scope")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    if state.fail_next > 0 {
        state.fail_next -= 1;
        return Some(error(StatusCode::SERVICE_UNAVAILABLE, "try again"));
    }

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match (bearer, &state.reject_token) {
        (None, _) => Some(error(StatusCode::UNAUTHORIZED, "missing token")),
        (Some(token), Some(rejected)) if token == rejected => {
            Some(error(StatusCode::UNAUTHORIZED, "token expired"))
        }
        _ => None,
    }
}

fn page(params: &HashMap<String, String>, items: Vec<Value>) -> Vec<Value> {
    let start: usize = params
        .get("startIndex")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let count: usize = params
        .get("count")
        .and_then(|v| v.parse().ok())
        .unwrap_or(100);
    items.into_iter().skip(start).take(count).collect()
}

async fn token(State(state): State<Shared>) -> Response {
    let mut state = state.lock().unwrap();
    if state.reject_refresh {
        return error(StatusCode::BAD_REQUEST, "invalid_grant");
    }
    state.token_refreshes += 1;
    Json(json!({
        "access_token": format!("token-{}", state.token_refreshes),
        "token_type": "bearer",
        "expires_in": state.token_expires_in,
    }))
    .into_response()
}

async fn list_campaigns(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Some(response) = precheck(&mut state, &headers) {
        return response;
    }
    state.list_requests += 1;

    let matching: Vec<Value> = state
        .campaigns
        .iter()
        .filter(|c| match params.get("stateFilter") {
            Some(filter) => filter.split(',').any(|s| c["state"] == json!(s)),
            None => true,
        })
        .cloned()
        .collect();

    Json(page(&params, matching)).into_response()
}

async fn list_orders(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Some(response) = precheck(&mut state, &headers) {
        return response;
    }
    state.list_requests += 1;

    let total = state.orders.len();
    Json(json!({
        "totalResults": total,
        "response": page(&params, state.orders.clone()),
    }))
    .into_response()
}

async fn show_campaign(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Some(response) = precheck(&mut state, &headers) {
        return response;
    }

    match state.campaigns.iter().find(|c| c["campaignId"] == json!(id)) {
        Some(campaign) => Json(campaign.clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, "campaign not found"),
    }
}

async fn create_campaigns(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(items): Json<Vec<Value>>,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Some(response) = precheck(&mut state, &headers) {
        return response;
    }

    let mut results = Vec::new();
    for mut item in items {
        if item.get("name").is_none() {
            results.push(json!({"code": "INVALID_ARGUMENT", "description": "name is required"}));
            continue;
        }
        state.next_id += 1;
        let id = state.next_id;
        item["campaignId"] = json!(id);
        state.campaigns.push(item);
        results.push(json!({"campaignId": id, "code": "SUCCESS"}));
    }

    (StatusCode::MULTI_STATUS, Json(results)).into_response()
}

async fn update_campaigns(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(items): Json<Vec<Value>>,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Some(response) = precheck(&mut state, &headers) {
        return response;
    }

    let mut results = Vec::new();
    for item in items {
        let id = item["campaignId"].clone();
        match state.campaigns.iter_mut().find(|c| c["campaignId"] == id) {
            Some(campaign) => {
                if let (Some(target), Some(source)) = (campaign.as_object_mut(), item.as_object()) {
                    for (k, v) in source {
                        target.insert(k.clone(), v.clone());
                    }
                }
                results.push(json!({"campaignId": id, "code": "SUCCESS"}));
            }
            None => results.push(json!({"campaignId": id, "code": "NOT_FOUND"})),
        }
    }

    (StatusCode::MULTI_STATUS, Json(results)).into_response()
}

async fn archive_campaign(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Some(response) = precheck(&mut state, &headers) {
        return response;
    }

    match state.campaigns.iter_mut().find(|c| c["campaignId"] == json!(id)) {
        Some(campaign) => {
            campaign["state"] = json!("archived");
            Json(json!({"campaignId": id, "code": "SUCCESS"})).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "campaign not found"),
    }
}
