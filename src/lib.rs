//! Ambari Metrics data source for dashboards.
//!
//! Translates panel queries into calls against the Ambari Metrics timeline
//! API, reshapes the responses into time series, and serves autocompletion
//! for app IDs, metric names and hosts.

pub mod cli;
pub mod datasource;
pub mod server;

#[allow(clippy::all, clippy::pedantic)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
