use anyhow::Result;
use prometheus::{CounterVec, GaugeVec, HistogramVec, IntCounter, IntGauge, Opts, Registry};
use std::time::Instant;

/// Self-monitoring for calls made to the metrics service.
#[derive(Clone)]
pub struct UpstreamMetrics {
    request_duration_seconds: HistogramVec,
    request_errors_total: CounterVec,
    last_request_success: GaugeVec,
    planned_requests_total: IntCounter,
    metadata_apps: IntGauge,
    metadata_metrics: IntGauge,
}

impl Default for UpstreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamMetrics {
    #[must_use]
    #[allow(clippy::expect_used)]
    ///
    /// # Panics
    ///
    /// Panics if metric creation fails.
    pub fn new() -> Self {
        let request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "ams_datasource_upstream_request_duration_seconds",
                "Time spent on metrics service requests in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["endpoint"],
        )
        .expect("ams_datasource_upstream_request_duration_seconds");

        let request_errors_total = CounterVec::new(
            Opts::new(
                "ams_datasource_upstream_errors_total",
                "Total number of failed metrics service requests per endpoint",
            ),
            &["endpoint"],
        )
        .expect("ams_datasource_upstream_errors_total");

        let last_request_success = GaugeVec::new(
            Opts::new(
                "ams_datasource_upstream_last_success",
                "Whether the last request to the endpoint succeeded (1=success, 0=failure)",
            ),
            &["endpoint"],
        )
        .expect("ams_datasource_upstream_last_success");

        let planned_requests_total = IntCounter::with_opts(Opts::new(
            "ams_datasource_planned_requests_total",
            "Series requests issued after template expansion",
        ))
        .expect("ams_datasource_planned_requests_total");

        let metadata_apps = IntGauge::with_opts(Opts::new(
            "ams_datasource_metadata_apps",
            "Application IDs in the metadata cache",
        ))
        .expect("ams_datasource_metadata_apps");

        let metadata_metrics = IntGauge::with_opts(Opts::new(
            "ams_datasource_metadata_metrics",
            "Metric descriptors in the metadata cache",
        ))
        .expect("ams_datasource_metadata_metrics");

        Self {
            request_duration_seconds,
            request_errors_total,
            last_request_success,
            planned_requests_total,
            metadata_apps,
            metadata_metrics,
        }
    }

    #[must_use]
    pub fn start_request(&self, endpoint: &'static str) -> RequestTimer {
        RequestTimer {
            endpoint,
            start: Instant::now(),
            metrics: self.clone(),
            finished: false,
        }
    }

    pub fn record_planned(&self, count: usize) {
        self.planned_requests_total
            .inc_by(u64::try_from(count).unwrap_or(u64::MAX));
    }

    pub fn record_metadata(&self, apps: usize, metrics: usize) {
        self.metadata_apps.set(i64::try_from(apps).unwrap_or(i64::MAX));
        self.metadata_metrics
            .set(i64::try_from(metrics).unwrap_or(i64::MAX));
    }

    fn record_success(&self, endpoint: &str, duration: f64) {
        self.request_duration_seconds
            .with_label_values(&[endpoint])
            .observe(duration);
        self.last_request_success
            .with_label_values(&[endpoint])
            .set(1.0);
    }

    fn record_error(&self, endpoint: &str, duration: f64) {
        self.request_duration_seconds
            .with_label_values(&[endpoint])
            .observe(duration);
        self.request_errors_total
            .with_label_values(&[endpoint])
            .inc();
        self.last_request_success
            .with_label_values(&[endpoint])
            .set(0.0);
    }

    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails.
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.request_duration_seconds.clone()))?;
        registry.register(Box::new(self.request_errors_total.clone()))?;
        registry.register(Box::new(self.last_request_success.clone()))?;
        registry.register(Box::new(self.planned_requests_total.clone()))?;
        registry.register(Box::new(self.metadata_apps.clone()))?;
        registry.register(Box::new(self.metadata_metrics.clone()))?;
        Ok(())
    }
}

/// Times one upstream request. A timer dropped without an outcome (the
/// request future was cancelled) records nothing.
pub struct RequestTimer {
    endpoint: &'static str,
    start: Instant,
    metrics: UpstreamMetrics,
    finished: bool,
}

impl RequestTimer {
    pub fn success(mut self) {
        self.finished = true;
        let duration = self.start.elapsed().as_secs_f64();
        self.metrics.record_success(self.endpoint, duration);
    }

    pub fn error(mut self) {
        self.finished = true;
        let duration = self.start.elapsed().as_secs_f64();
        self.metrics.record_error(self.endpoint, duration);
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(endpoint = self.endpoint, "upstream request abandoned");
        }
    }
}
