//! Ambari Metrics data source: panel queries, templating lookups and
//! autocompletion against the metrics service timeline API.

pub mod cache;
pub mod client;
pub mod config;
pub mod hosts;
pub mod normalize;
pub mod request;
pub mod target;
pub mod template;
pub mod upstream;

pub use cache::MetadataCache;
pub use client::AmsClient;
pub use config::{BasicAuth, DatasourceConfig, FailurePolicy};
pub use normalize::TimeSeries;
pub use target::{QueryOptions, Target, TimeRange};
pub use template::{InterpolationError, TemplateVariable};
pub use upstream::UpstreamMetrics;

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, instrument, warn};
use tracing_futures::Instrument as _;

use hosts::{FAKE_HOSTNAME, HOSTS_PATH, HostComponents};
use normalize::MetricsResponse;
use template::PlannedRequest;

/// Aggregations the metrics service supports.
pub const AGGREGATORS: &[&str] = &["avg", "sum", "min", "max"];

/// Autocomplete entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
}

/// Templating query result entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindResult {
    pub text: String,
    pub expandable: bool,
}

impl FindResult {
    fn leaf(text: String) -> Self {
        Self {
            text,
            expandable: false,
        }
    }
}

/// Outcome of the connectivity probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub status: String,
    pub message: String,
    pub title: String,
}

impl TestResult {
    #[must_use]
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
            message: "Data source is working".to_string(),
            title: "Success".to_string(),
        }
    }

    #[must_use]
    pub fn failure(message: String) -> Self {
        Self {
            status: "error".to_string(),
            message,
            title: "Error".to_string(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// A series request that failed under [`FailurePolicy::Partial`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    pub metric: String,
    pub hostname: String,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub data: Vec<TimeSeries>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<TargetError>,
}

pub struct AmbariMetricsDatasource {
    name: String,
    client: AmsClient,
    cache: Arc<MetadataCache>,
    failure_policy: FailurePolicy,
}

impl AmbariMetricsDatasource {
    /// Create a data source with an empty metadata cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &DatasourceConfig, metrics: UpstreamMetrics) -> Result<Self> {
        Self::with_cache(config, metrics, Arc::new(MetadataCache::new()))
    }

    /// Create a data source around an existing metadata cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_cache(
        config: &DatasourceConfig,
        metrics: UpstreamMetrics,
        cache: Arc<MetadataCache>,
    ) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            client: AmsClient::new(config, metrics)?,
            cache,
            failure_policy: config.failure_policy,
        })
    }

    /// Create the data source and kick off the metadata refresh in the
    /// background. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn connect(config: &DatasourceConfig, metrics: UpstreamMetrics) -> Result<Arc<Self>> {
        let datasource = Arc::new(Self::new(config, metrics)?);
        datasource.spawn_metadata_refresh(config.metadata_refresh_interval);
        Ok(datasource)
    }

    /// Refresh metadata now, then every `interval` if one is given.
    pub fn spawn_metadata_refresh(self: &Arc<Self>, interval: Option<Duration>) -> JoinHandle<()> {
        let datasource = Arc::clone(self);
        tokio::spawn(
            async move {
                datasource.refresh_metadata().await;

                let Some(period) = interval else { return };
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // the first tick completes immediately
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    datasource.refresh_metadata().await;
                }
            }
            .instrument(info_span!("metadata.refresh_loop", datasource = %self.name)),
        )
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    #[must_use]
    pub const fn client(&self) -> &AmsClient {
        &self.client
    }

    pub async fn refresh_metadata(&self) -> bool {
        self.cache.refresh(&self.client).await
    }

    async fn fetch_series(&self, request: &PlannedRequest, range: TimeRange) -> Result<TimeSeries> {
        let target = &request.target;
        if target.hide {
            return Ok(TimeSeries::empty(&target.metric));
        }

        let url = request::series_url(self.client.base_url(), request, range)?;
        debug!(
            app = %target.app,
            metric = %target.metric,
            host = %request.hostname(),
            "querying series"
        );
        let response: MetricsResponse = self.client.get_json("series", url).await?;
        Ok(normalize::normalize(target, &response))
    }

    /// Run a panel query: expand targets over template hosts, fetch every
    /// series concurrently and return them in request order.
    ///
    /// # Errors
    ///
    /// Under [`FailurePolicy::AllOrNothing`] the first failed request fails
    /// the query. Under [`FailurePolicy::Partial`] this does not fail.
    #[instrument(skip(self, options), level = "info", err, fields(datasource = %self.name, targets = options.targets.len(), otel.kind = "internal"))]
    pub async fn query(&self, options: &QueryOptions) -> Result<QueryResponse> {
        let planned = template::plan(&options.targets, &options.variables);
        self.client.metrics().record_planned(planned.len());
        info!(requests = planned.len(), "dispatching series requests");

        let mut tasks = FuturesUnordered::new();
        for (index, request) in planned.iter().enumerate() {
            let span = info_span!(
                "datasource.series",
                metric = %request.target.metric,
                app = %request.target.app,
                host = %request.hostname(),
                otel.kind = "internal"
            );
            tasks.push(
                async move { (index, request, self.fetch_series(request, options.range).await) }
                    .instrument(span),
            );
        }

        let mut series = Vec::with_capacity(planned.len());
        let mut errors = Vec::new();

        while let Some((index, request, result)) = tasks.next().await {
            match (result, self.failure_policy) {
                (Ok(s), _) => series.push((index, s)),
                (Err(e), FailurePolicy::AllOrNothing) => {
                    return Err(e.context(format!(
                        "query for {} on '{}' failed",
                        request.target.metric,
                        request.hostname()
                    )));
                }
                (Err(e), FailurePolicy::Partial) => {
                    warn!(metric = %request.target.metric, host = %request.hostname(), error = %e, "series request failed");
                    series.push((index, TimeSeries::empty(&request.target.metric)));
                    errors.push((
                        index,
                        TargetError {
                            ref_id: request.target.ref_id.clone(),
                            metric: request.target.metric.clone(),
                            hostname: request.hostname().to_string(),
                            message: format!("{e:#}"),
                        },
                    ));
                }
            }
        }

        series.sort_by_key(|(index, _)| *index);
        errors.sort_by_key(|(index, _)| *index);

        Ok(QueryResponse {
            data: series.into_iter().map(|(_, s)| s).collect(),
            errors: errors.into_iter().map(|(_, e)| e).collect(),
        })
    }

    async fn fetch_hosts(&self) -> Result<HostComponents> {
        let url = self.client.endpoint(HOSTS_PATH)?;
        self.client.get_json("hosts", url).await
    }

    /// Resolve a templating query to suggestion entries.
    ///
    /// With a `components` variable selected this lists that component's
    /// hosts; otherwise the interpolated query is looked up as a timeline
    /// path and its top-level keys are returned.
    ///
    /// # Errors
    ///
    /// Returns an [`InterpolationError`] for a bad variable format, or the
    /// upstream error if the lookup fails.
    #[instrument(skip(self, variables), level = "info", err, fields(datasource = %self.name, otel.kind = "internal"))]
    pub async fn metric_find_query(
        &self,
        query: &str,
        variables: &[TemplateVariable],
    ) -> Result<Vec<FindResult>> {
        let interpolated = template::interpolate(query, variables)?;

        if let Some(component) = template::selected_component(variables) {
            let hosts = self.fetch_hosts().await?;
            return Ok(hosts::hosts_for_component(&hosts, component)
                .into_iter()
                .map(FindResult::leaf)
                .collect());
        }

        let path = format!("{}/{}", request::METRICS_PATH, interpolated.trim_start_matches('/'));
        let url = self.client.endpoint(&path)?;
        let results: Map<String, Value> = self
            .client
            .get_json("templating", url)
            .await
            .with_context(|| format!("templating lookup '{interpolated}' failed"))?;

        Ok(results
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| key != FAKE_HOSTNAME)
            .map(FindResult::leaf)
            .collect())
    }

    /// Probe the metadata endpoint.
    #[instrument(skip(self), level = "info", fields(datasource = %self.name, otel.kind = "internal"))]
    pub async fn test_datasource(&self) -> TestResult {
        let url = match self.client.endpoint(cache::METADATA_PATH) {
            Ok(url) => url,
            Err(e) => return TestResult::failure(format!("{e:#}")),
        };

        match self.client.probe("metadata", url).await {
            Ok(status) if status == reqwest::StatusCode::OK => TestResult::success(),
            Ok(status) => TestResult::failure(format!("Metrics service returned {status}")),
            Err(e) => TestResult::failure(format!("{e:#}")),
        }
    }

    /// Cached app IDs, ascending.
    #[must_use]
    pub fn suggest_apps(&self) -> Vec<Suggestion> {
        self.cache
            .list_apps()
            .into_iter()
            .map(|text| Suggestion { text })
            .collect()
    }

    /// Cached metric names of `app`, sorted case-insensitively.
    #[must_use]
    pub fn suggest_metrics(&self, app: Option<&str>) -> Vec<Suggestion> {
        app.map(|app| self.cache.list_metrics(app))
            .unwrap_or_default()
            .into_iter()
            .map(|text| Suggestion { text })
            .collect()
    }

    /// Hosts registered under `app`, sorted case-insensitively. An empty
    /// `app` matches nothing and is not looked up.
    ///
    /// # Errors
    ///
    /// Returns an error if the hosts lookup fails.
    #[instrument(skip(self), level = "info", err, fields(datasource = %self.name, otel.kind = "internal"))]
    pub async fn suggest_hosts(&self, app: &str) -> Result<Vec<Suggestion>> {
        if app.is_empty() {
            return Ok(Vec::new());
        }
        let hosts = self.fetch_hosts().await?;
        Ok(hosts::hosts_for_component(&hosts, app)
            .into_iter()
            .map(|text| Suggestion { text })
            .collect())
    }

    /// The fixed aggregator list; the same slice on every call.
    #[must_use]
    pub const fn get_aggregators() -> &'static [&'static str] {
        AGGREGATORS
    }
}
