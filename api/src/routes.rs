use crate::aggregator::Aggregator;
use crate::errors::ApiError;
use crate::metrics_defs::REQUEST_DURATION;
use amazon_ads::client::SCOPE_HEADER;
use amazon_ads::{AdsApi, EntityKey, Outcome, QueryParams, Record, Resource, Scope};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use docdb_cache::DateRange;
use shared::histogram;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub ads: Arc<dyn AdsApi>,
    pub aggregator: Arc<Aggregator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/{api}/{resource}", get(index).post(create).put(update))
        .route("/{api}/{resource}/performance", get(performance))
        .route("/{api}/{resource}/{id}", get(show).delete(destroy))
        .layer(middleware::from_fn(track_request))
        .with_state(state)
}

async fn track_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    histogram!(REQUEST_DURATION,
        "method" => method.to_string(),
        "status" => status.as_u16().to_string()
    )
    .record(started.elapsed().as_secs_f64());
    tracing::debug!(%method, %path, status = status.as_u16(), "handled request");

    response
}

fn resolve(api: &str, resource: &str) -> Result<Resource, ApiError> {
    let slug = format!("{api}/{resource}");
    Resource::from_slug(&slug).ok_or(ApiError::UnknownResource(slug))
}

fn scope(headers: &HeaderMap) -> Result<Scope, ApiError> {
    headers
        .get(SCOPE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(Scope::new)
        .ok_or(ApiError::MissingScope)
}

fn records(body: Result<Json<Vec<Record>>, JsonRejection>) -> Result<Vec<Record>, ApiError> {
    let Json(records) = body.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    if records.is_empty() {
        return Err(ApiError::InvalidBody("expected at least one record".into()));
    }
    Ok(records)
}

async fn index(
    State(state): State<AppState>,
    Path((api, resource)): Path<(String, String)>,
    headers: HeaderMap,
    Query(params): Query<QueryParams>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let resource = resolve(&api, &resource)?;
    let scope = scope(&headers)?;

    Ok(Json(state.ads.index(&scope, resource, &params).await?))
}

async fn performance(
    State(state): State<AppState>,
    Path((api, resource)): Path<(String, String)>,
    headers: HeaderMap,
    Query(params): Query<QueryParams>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let resource = resolve(&api, &resource)?;
    let scope = scope(&headers)?;

    let range = DateRange::from_params(&params)?;
    if range.start.is_none() {
        return Err(ApiError::MissingParam("startDate"));
    }
    if range.end.is_none() {
        return Err(ApiError::MissingParam("endDate"));
    }

    let mut records = state.ads.index(&scope, resource, &params).await?;
    state
        .aggregator
        .attach_performance(&mut records, resource, range, &scope.profile_id)
        .await?;

    Ok(Json(records))
}

async fn show(
    State(state): State<AppState>,
    Path((api, resource, id)): Path<(String, String, String)>,
    headers: HeaderMap,
    Query(params): Query<QueryParams>,
) -> Result<Json<Record>, ApiError> {
    let resource = resolve(&api, &resource)?;
    let scope = scope(&headers)?;
    let key = EntityKey::parse(resource, &id)?;

    state
        .ads
        .show(&scope, resource, &key, &params)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("{resource} {key}")))
}

async fn create(
    State(state): State<AppState>,
    Path((api, resource)): Path<(String, String)>,
    headers: HeaderMap,
    body: Result<Json<Vec<Record>>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<Outcome>>), ApiError> {
    let resource = resolve(&api, &resource)?;
    let scope = scope(&headers)?;
    let records = records(body)?;

    let outcomes = state.ads.create(&scope, resource, records).await?;
    Ok((StatusCode::MULTI_STATUS, Json(outcomes)))
}

async fn update(
    State(state): State<AppState>,
    Path((api, resource)): Path<(String, String)>,
    headers: HeaderMap,
    body: Result<Json<Vec<Record>>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<Outcome>>), ApiError> {
    let resource = resolve(&api, &resource)?;
    let scope = scope(&headers)?;
    let records = records(body)?;

    let outcomes = state.ads.update(&scope, resource, records).await?;
    Ok((StatusCode::MULTI_STATUS, Json(outcomes)))
}

async fn destroy(
    State(state): State<AppState>,
    Path((api, resource, id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<Outcome>, ApiError> {
    let resource = resolve(&api, &resource)?;
    let scope = scope(&headers)?;
    let key = EntityKey::parse(resource, &id)?;

    Ok(Json(state.ads.destroy(&scope, resource, &key).await?))
}
