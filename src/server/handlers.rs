use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use prometheus::TextEncoder;
use serde::Deserialize;
use tracing::error;

use super::{AppState, error::ApiError};
use crate::datasource::{
    AmbariMetricsDatasource, FindResult, QueryOptions, QueryResponse, Suggestion, TemplateVariable,
    TestResult,
};

#[derive(Debug, Default, Deserialize)]
pub struct AppParams {
    pub app: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
}

pub async fn test_datasource(State(state): State<AppState>) -> Json<TestResult> {
    Json(state.datasource.test_datasource().await)
}

pub async fn query(
    State(state): State<AppState>,
    Json(options): Json<QueryOptions>,
) -> Result<Json<QueryResponse>, ApiError> {
    Ok(Json(state.datasource.query(&options).await?))
}

pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<FindResult>>, ApiError> {
    let results = state
        .datasource
        .metric_find_query(&request.query, &request.variables)
        .await?;
    Ok(Json(results))
}

pub async fn suggest_apps(State(state): State<AppState>) -> Json<Vec<Suggestion>> {
    Json(state.datasource.suggest_apps())
}

pub async fn suggest_metrics(
    State(state): State<AppState>,
    Query(params): Query<AppParams>,
) -> Json<Vec<Suggestion>> {
    Json(state.datasource.suggest_metrics(params.app.as_deref()))
}

pub async fn suggest_hosts(
    State(state): State<AppState>,
    Query(params): Query<AppParams>,
) -> Result<Json<Vec<Suggestion>>, ApiError> {
    let app = params.app.unwrap_or_default();
    Ok(Json(state.datasource.suggest_hosts(&app).await?))
}

pub async fn aggregators() -> Json<&'static [&'static str]> {
    Json(AmbariMetricsDatasource::get_aggregators())
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&state.registry.gather()) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        ),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                format!("failed to encode metrics: {e}"),
            )
        }
    }
}
