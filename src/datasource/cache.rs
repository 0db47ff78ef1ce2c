//! Snapshot of the metrics service metadata used for autocompletion.
//!
//! The snapshot is replaced wholesale by [`MetadataCache::refresh`] and read
//! without locking. Readers may see a stale snapshot, or an empty one until
//! the first refresh completes.

use arc_swap::ArcSwap;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::client::AmsClient;
use super::hosts::sort_case_insensitive;

pub const METADATA_PATH: &str = "/ws/v1/timeline/metrics/metadata";

/// Synthetic apps that carry no useful metrics.
pub const EXCLUDED_APPS: [&str; 2] = ["timeline_metric_store_watcher", "amssmoketestfake"];

/// One entry of the metadata listing; only the name is used.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MetricMetadata {
    #[serde(default, rename = "metricname")]
    pub metric_name: String,
}

/// Body returned by the metadata endpoint: app ID to its metrics.
pub type MetadataListing = HashMap<String, Vec<MetricMetadata>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub metric: String,
    pub app: String,
}

#[derive(Debug, Default)]
pub struct MetadataSnapshot {
    metrics: Vec<MetricDescriptor>,
    apps: BTreeSet<String>,
}

impl MetadataSnapshot {
    #[must_use]
    pub fn from_listing(listing: MetadataListing) -> Self {
        let mut snapshot = Self::default();
        for (app, metrics) in listing {
            if EXCLUDED_APPS.contains(&app.as_str()) {
                continue;
            }
            snapshot.metrics.extend(
                metrics
                    .into_iter()
                    .filter(|m| !m.metric_name.is_empty())
                    .map(|m| MetricDescriptor {
                        metric: m.metric_name,
                        app: app.clone(),
                    }),
            );
            snapshot.apps.insert(app);
        }
        snapshot
    }

    #[must_use]
    pub fn metrics(&self) -> &[MetricDescriptor] {
        &self.metrics
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct MetadataCache {
    snapshot: ArcSwap<MetadataSnapshot>,
}

impl MetadataCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<MetadataSnapshot> {
        self.snapshot.load_full()
    }

    pub fn replace(&self, snapshot: MetadataSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    /// Fetch the metadata listing and swap it in.
    ///
    /// Failures are logged and leave the current snapshot in place. Returns
    /// whether the snapshot was replaced.
    #[instrument(skip(self, client), level = "info", fields(otel.kind = "internal"))]
    pub async fn refresh(&self, client: &AmsClient) -> bool {
        let url = match client.endpoint(METADATA_PATH) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "cannot build metadata URL");
                return false;
            }
        };

        match client.get_json::<MetadataListing>("metadata", url).await {
            Ok(listing) => {
                let snapshot = MetadataSnapshot::from_listing(listing);
                client
                    .metrics()
                    .record_metadata(snapshot.apps.len(), snapshot.metrics.len());
                info!(
                    apps = snapshot.apps.len(),
                    metrics = snapshot.metrics.len(),
                    "metadata cache refreshed"
                );
                self.replace(snapshot);
                true
            }
            Err(e) => {
                warn!(error = %e, "metadata refresh failed; keeping previous snapshot");
                false
            }
        }
    }

    /// Known app IDs in ascending order.
    #[must_use]
    pub fn list_apps(&self) -> Vec<String> {
        self.snapshot.load().apps.iter().cloned().collect()
    }

    /// Metric names of `app`, sorted case-insensitively.
    #[must_use]
    pub fn list_metrics(&self, app: &str) -> Vec<String> {
        if app.is_empty() {
            return Vec::new();
        }
        let mut names: Vec<String> = self
            .snapshot
            .load()
            .metrics
            .iter()
            .filter(|descriptor| descriptor.app == app)
            .map(|descriptor| descriptor.metric.clone())
            .collect();
        sort_case_insensitive(&mut names);
        names
    }
}
