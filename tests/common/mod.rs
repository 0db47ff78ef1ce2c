// each test binary uses a different subset of these helpers
#![allow(dead_code)]

use ams_datasource::datasource::{
    AmbariMetricsDatasource, DatasourceConfig, FailurePolicy, UpstreamMetrics,
};
use anyhow::Result;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

/// Series requests whose metric name starts with this fail with 500.
pub const BROKEN_PREFIX: &str = "broken";
/// Series requests whose metric name starts with this return no series.
pub const MISSING_PREFIX: &str = "missing";

#[derive(Default)]
struct Recorded {
    series: Vec<HashMap<String, String>>,
    lookups: Vec<String>,
    authorization: Vec<Option<String>>,
}

#[derive(Clone)]
struct FakeState {
    metadata_status: StatusCode,
    recorded: Arc<Mutex<Recorded>>,
}

impl FakeState {
    fn record_auth(&self, headers: &HeaderMap) {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.authorization.push(auth);
        }
    }
}

/// In-process stand-in for the metrics service timeline API.
pub struct FakeAms {
    pub url: String,
    recorded: Arc<Mutex<Recorded>>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for FakeAms {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl FakeAms {
    pub async fn start() -> Result<Self> {
        Self::start_with_metadata_status(StatusCode::OK).await
    }

    pub async fn start_with_metadata_status(metadata_status: StatusCode) -> Result<Self> {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let state = FakeState {
            metadata_status,
            recorded: Arc::clone(&recorded),
        };

        let app = Router::new()
            .route("/ws/v1/timeline/metrics", get(series))
            .route("/ws/v1/timeline/metrics/metadata", get(metadata))
            .route("/ws/v1/timeline/metrics/hosts", get(hosts))
            .route("/ws/v1/timeline/metrics/{*rest}", get(lookup))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            url,
            recorded,
            handle,
        })
    }

    /// Query parameters of every series request, in arrival order.
    pub fn series_requests(&self) -> Vec<HashMap<String, String>> {
        self.recorded
            .lock()
            .map(|r| r.series.clone())
            .unwrap_or_default()
    }

    /// Paths requested through the generic templating lookup.
    pub fn lookups(&self) -> Vec<String> {
        self.recorded
            .lock()
            .map(|r| r.lookups.clone())
            .unwrap_or_default()
    }

    /// `Authorization` header of every request.
    pub fn authorization(&self) -> Vec<Option<String>> {
        self.recorded
            .lock()
            .map(|r| r.authorization.clone())
            .unwrap_or_default()
    }

    pub fn config(&self) -> Result<DatasourceConfig> {
        Ok(DatasourceConfig::new("fake", Url::parse(&self.url)?).with_timeout(Duration::from_secs(5)))
    }

    pub fn datasource(&self, policy: FailurePolicy) -> Result<AmbariMetricsDatasource> {
        AmbariMetricsDatasource::new(
            &self.config()?.with_failure_policy(policy),
            UpstreamMetrics::new(),
        )
    }
}

async fn series(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.record_auth(&headers);
    if let Ok(mut recorded) = state.recorded.lock() {
        recorded.series.push(params.clone());
    }

    let metric_names = params.get("metricNames").cloned().unwrap_or_default();
    if metric_names.starts_with(BROKEN_PREFIX) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "collector exploded").into_response();
    }
    if metric_names.starts_with(MISSING_PREFIX) {
        return Json(json!({"metrics": []})).into_response();
    }

    let hostname = params
        .get("hostname")
        .filter(|h| !h.is_empty())
        .cloned()
        .unwrap_or_else(|| "h1".to_string());

    Json(json!({
        "metrics": [{
            "metricname": metric_names,
            "appid": params.get("appId"),
            "hostname": hostname,
            "metrics": {"2999": 2.0, "1000": 0.5, "1500": 1.0}
        }]
    }))
    .into_response()
}

async fn metadata(State(state): State<FakeState>, headers: HeaderMap) -> Response {
    state.record_auth(&headers);
    if state.metadata_status != StatusCode::OK {
        return (state.metadata_status, "unavailable").into_response();
    }
    Json(json!({
        "HOST": [
            {"metricname": "mem_free", "type": "Long"},
            {"metricname": "cpu_user", "type": "Double"},
            {"metricname": "Bytes_in"}
        ],
        "datanode": [{"metricname": "dfs.datanode.BlocksRead"}],
        "timeline_metric_store_watcher": [{"metricname": "watcher.metric"}],
        "amssmoketestfake": [{"metricname": "AMBARI_METRICS.SmokeTest.FakeMetric"}]
    }))
    .into_response()
}

async fn hosts(State(state): State<FakeState>, headers: HeaderMap) -> Json<Value> {
    state.record_auth(&headers);
    Json(json!({
        "h3": ["HOST", "NAMENODE"],
        "H2": ["HOST"],
        "h1": ["HOST", "DATANODE"],
        "fakehostname": ["HOST", "DATANODE"]
    }))
}

async fn lookup(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Path(rest): Path<String>,
) -> Json<Value> {
    state.record_auth(&headers);
    if let Ok(mut recorded) = state.recorded.lock() {
        recorded.lookups.push(rest);
    }
    Json(json!({
        "c6402.ambari.apache.org": {},
        "c6401.ambari.apache.org": {},
        "fakehostname": {}
    }))
}

/// A peer that accepts connections and never answers.
pub struct StalledPeer {
    pub url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for StalledPeer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl StalledPeer {
    pub async fn start() -> Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        let handle = tokio::spawn(async move {
            // held open until the task is aborted
            let mut connections = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                connections.push(stream);
            }
        });
        Ok(Self { url, handle })
    }
}

/// Get an available port for testing
pub fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to ephemeral port")
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

/// Build test URL for HTTP requests
pub fn get_test_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

/// Wait for server to be ready
pub async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    for _ in 0..max_attempts {
        if tokio::net::TcpStream::connect(format!("127.0.0.1:{port}"))
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(100)).await;
    }
    false
}

/// Poll until the data source has loaded metadata.
pub async fn wait_for_metadata(datasource: &AmbariMetricsDatasource, max_attempts: u32) -> bool {
    for _ in 0..max_attempts {
        if !datasource.cache().snapshot().is_empty() {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}
