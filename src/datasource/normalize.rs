use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::target::Target;

/// `[value, timestamp_ms]`, serialized as a two element array.
pub type Datapoint = (f64, i64);

/// One series in the shape the dashboard renders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub target: String,
    pub datapoints: Vec<Datapoint>,
}

impl TimeSeries {
    /// A series with no points, so the panel still gets a legend entry.
    #[must_use]
    pub fn empty(metric: &str) -> Self {
        Self {
            target: metric.to_string(),
            datapoints: Vec::new(),
        }
    }
}

/// Body returned by `/ws/v1/timeline/metrics`.
#[derive(Debug, Default, Deserialize)]
pub struct MetricsResponse {
    #[serde(default)]
    pub metrics: Vec<MetricSeries>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricSeries {
    #[serde(default)]
    pub hostname: Option<String>,
    /// Millisecond timestamp (as an object key) to value.
    #[serde(default)]
    pub metrics: Map<String, Value>,
}

/// Truncate a millisecond timestamp to the second boundary below it.
///
/// `None` when that boundary is below `i64::MIN`.
#[must_use]
pub const fn floor_to_second(timestamp_ms: i64) -> Option<i64> {
    timestamp_ms.checked_sub(timestamp_ms.rem_euclid(1000))
}

fn label(target: &Target, reported_host: Option<&str>) -> String {
    match (target.explicit_hosts(), reported_host) {
        (Some(hosts), _) => format!("{} on {hosts}", target.metric),
        (None, Some(host)) => format!("{} on {host}", target.metric),
        (None, None) => target.metric.clone(),
    }
}

/// Reshape a metrics-service response into one series for `target`.
///
/// Only the first series of the response is used. Keys that are not integer
/// milliseconds or cannot be floored to a second, and values that are not
/// numbers, are skipped.
#[must_use]
pub fn normalize(target: &Target, response: &MetricsResponse) -> TimeSeries {
    let Some(first) = response.metrics.first() else {
        return TimeSeries::empty(&target.metric);
    };
    if target.hide {
        return TimeSeries::empty(&target.metric);
    }

    let reported_host = first.hostname.as_deref().filter(|h| !h.is_empty());

    let mut datapoints: Vec<Datapoint> = first
        .metrics
        .iter()
        .filter_map(|(key, value)| {
            let Ok(timestamp) = key.trim().parse::<i64>() else {
                debug!(metric = %target.metric, key = %key, "skipping non-numeric timestamp");
                return None;
            };
            let Some(value) = value.as_f64() else {
                debug!(metric = %target.metric, timestamp, "skipping non-numeric value");
                return None;
            };
            let Some(floored) = floor_to_second(timestamp) else {
                debug!(metric = %target.metric, timestamp, "skipping out of range timestamp");
                return None;
            };
            Some((value, floored))
        })
        .collect();

    datapoints.sort_by_key(|&(_, timestamp)| timestamp);

    TimeSeries {
        target: label(target, reported_host),
        datapoints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: &Value) -> MetricsResponse {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    fn target(metric: &str) -> Target {
        Target {
            metric: metric.to_string(),
            ..Target::default()
        }
    }

    #[test]
    fn test_floor_to_second() {
        assert_eq!(floor_to_second(1_999), Some(1_000));
        assert_eq!(floor_to_second(2_000), Some(2_000));
        assert_eq!(floor_to_second(0), Some(0));
        assert_eq!(floor_to_second(-1), Some(-1_000));
        assert_eq!(floor_to_second(i64::MIN), None);
        assert_eq!(
            floor_to_second(-9_223_372_036_854_774_001),
            Some(-9_223_372_036_854_775_000)
        );
    }

    #[test]
    fn test_normalize_skips_unfloorable_timestamps() {
        let res = response(&json!({"metrics": [{"metrics": {
            "-9223372036854775808": 1, "3000": 2
        }}]}));
        let series = normalize(&target("cpu_user"), &res);

        assert_eq!(series.datapoints, vec![(2.0, 3000)]);
    }

    #[test]
    fn test_normalize_round_trip() {
        let res = response(&json!({"metrics": [{"metrics": {"1000": 5, "2000": 7}}]}));
        let series = normalize(&target("cpu_user"), &res);

        assert_eq!(series.target, "cpu_user");
        assert_eq!(series.datapoints, vec![(5.0, 1000), (7.0, 2000)]);
    }

    #[test]
    fn test_normalize_sorts_numerically() {
        let res = response(&json!({"metrics": [{"metrics": {
            "10000": 3, "9000": 2, "100000": 4, "1500": 1
        }}]}));
        let series = normalize(&target("cpu_user"), &res);

        assert_eq!(
            series.datapoints,
            vec![(1.0, 1000), (2.0, 9000), (3.0, 10_000), (4.0, 100_000)]
        );
    }

    #[test]
    fn test_normalize_skips_bad_entries() {
        let res = response(&json!({"metrics": [{"metrics": {
            "abc": 1, "2000": null, "3000": 2.5
        }}]}));
        let series = normalize(&target("cpu_user"), &res);

        assert_eq!(series.datapoints, vec![(2.5, 3000)]);
    }

    #[test]
    fn test_normalize_labels_with_reported_host() {
        let res = response(&json!({"metrics": [{"hostname": "h1", "metrics": {"1000": 1}}]}));
        assert_eq!(normalize(&target("cpu_user"), &res).target, "cpu_user on h1");
    }

    #[test]
    fn test_normalize_requested_hosts_take_precedence() {
        let res = response(&json!({"metrics": [{"hostname": "h1", "metrics": {"1000": 1}}]}));
        let t = Target {
            hosts: "h2,h3".to_string(),
            ..target("cpu_user")
        };
        assert_eq!(normalize(&t, &res).target, "cpu_user on h2,h3");
    }

    #[test]
    fn test_normalize_empty_response() {
        let res = response(&json!({"metrics": []}));
        let series = normalize(&target("cpu_user"), &res);

        assert_eq!(series, TimeSeries::empty("cpu_user"));
    }

    #[test]
    fn test_normalize_hidden_target() {
        let res = response(&json!({"metrics": [{"hostname": "h1", "metrics": {"1000": 1}}]}));
        let t = Target {
            hide: true,
            ..target("cpu_user")
        };
        assert_eq!(normalize(&t, &res), TimeSeries::empty("cpu_user"));
    }

    #[test]
    fn test_series_serializes_as_pairs() -> serde_json::Result<()> {
        let series = TimeSeries {
            target: "cpu_user".to_string(),
            datapoints: vec![(5.0, 1000)],
        };
        assert_eq!(
            serde_json::to_value(&series)?,
            json!({"target": "cpu_user", "datapoints": [[5.0, 1000]]})
        );
        Ok(())
    }
}
