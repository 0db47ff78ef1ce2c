use anyhow::{Context, Result, anyhow};
use chrono::DateTime;
use serde::{Deserialize, Serialize};

use super::template::TemplateVariable;

/// One query specification within a dashboard panel.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Target {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    pub metric: String,
    pub app: String,
    /// Comma separated host list, empty when the target is app scoped.
    pub hosts: String,
    pub aggregator: String,
    pub precision: String,
    pub should_add_precision: bool,
    pub should_compute_rate: bool,
    pub hide: bool,
    /// Set on the clones produced by template expansion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templated_host: Option<String>,
}

impl Target {
    /// The explicit host list, if the target names one.
    #[must_use]
    pub fn explicit_hosts(&self) -> Option<&str> {
        let hosts = self.hosts.trim();
        if hosts.is_empty() { None } else { Some(hosts) }
    }
}

/// Inclusive query window in epoch seconds, as sent to the metrics service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct TimeRange {
    pub from: i64,
    pub to: i64,
}

impl TimeRange {
    #[must_use]
    pub const fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }

    /// Build a range from epoch milliseconds, flooring both bounds to seconds.
    #[must_use]
    pub const fn from_millis(from_ms: i64, to_ms: i64) -> Self {
        Self {
            from: from_ms.div_euclid(1000),
            to: to_ms.div_euclid(1000),
        }
    }
}

/// A range bound as the dashboard sends it: RFC 3339 text or epoch millis.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimeBound {
    Millis(i64),
    Text(String),
}

impl TimeBound {
    fn to_millis(&self) -> Result<i64> {
        match self {
            Self::Millis(ms) => Ok(*ms),
            Self::Text(text) => {
                if let Ok(ms) = text.trim().parse::<i64>() {
                    return Ok(ms);
                }
                DateTime::parse_from_rfc3339(text.trim())
                    .map(|dt| dt.timestamp_millis())
                    .with_context(|| format!("invalid time bound: {text}"))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRange {
    from: TimeBound,
    to: TimeBound,
}

impl TryFrom<RawRange> for TimeRange {
    type Error = anyhow::Error;

    fn try_from(raw: RawRange) -> Result<Self> {
        let range = Self::from_millis(raw.from.to_millis()?, raw.to.to_millis()?);
        if range.from > range.to {
            return Err(anyhow!(
                "time range starts after it ends ({} > {})",
                range.from,
                range.to
            ));
        }
        Ok(range)
    }
}

/// Body of a panel query.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    pub range: TimeRange,
    #[serde(default)]
    pub targets: Vec<Target>,
    /// Dashboard template variables in effect for this query.
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
}
