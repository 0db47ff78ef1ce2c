use anyhow::{Context, Result};
use url::Url;

use super::target::{Target, TimeRange};
use super::template::PlannedRequest;

pub const METRICS_PATH: &str = "/ws/v1/timeline/metrics";
pub const RATE_MARKER: &str = "._rate._";
pub const PLAIN_MARKER: &str = "._";
/// Precision whose series are not pre-aggregated.
pub const SECONDS_PRECISION: &str = "seconds";

/// Join a metrics-service path onto the configured base URL.
///
/// # Errors
///
/// Returns an error if the result is not a valid URL.
pub fn endpoint(base: &str, path: &str) -> Result<Url> {
    let joined = format!("{}{path}", base.trim_end_matches('/'));
    Url::parse(&joined).with_context(|| format!("invalid metrics service URL: {joined}"))
}

/// The `metricNames` value: metric, rate marker, then the aggregator.
#[must_use]
pub fn metric_names(target: &Target) -> String {
    let marker = if target.should_compute_rate {
        RATE_MARKER
    } else {
        PLAIN_MARKER
    };
    let aggregator = if target.precision == SECONDS_PRECISION {
        ""
    } else {
        target.aggregator.as_str()
    };
    format!("{}{marker}{aggregator}", target.metric)
}

/// Build the series query URL for one planned request.
///
/// # Errors
///
/// Returns an error if `base` does not form a valid URL.
pub fn series_url(base: &str, request: &PlannedRequest, range: TimeRange) -> Result<Url> {
    let target = &request.target;
    let mut url = endpoint(base, METRICS_PATH)?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("metricNames", &metric_names(target))
            .append_pair("hostname", request.hostname())
            .append_pair("appId", &target.app)
            .append_pair("startTime", &range.from.to_string())
            .append_pair("endTime", &range.to.to_string());
        if target.should_add_precision && !target.precision.is_empty() {
            query.append_pair("precision", &target.precision);
        }
    }

    Ok(url)
}
