use crate::{
    cli::actions::Action,
    datasource::{DatasourceConfig, FailurePolicy},
};
use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use secrecy::SecretString;
use std::time::Duration;
use tracing::info;
use url::Url;

/// # Errors
///
/// Returns an error if required arguments are missing or invalid
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    // Get the port or return an error
    let port = matches
        .get_one::<u16>("port")
        .copied()
        .ok_or_else(|| anyhow!("Port is required. Please provide it using the --port flag."))?;

    // Get the listen address (None means auto-detect)
    let listen = matches
        .get_one::<String>("listen")
        .map(std::string::ToString::to_string);

    let config = datasource_config(matches)?;

    info!(
        datasource = %config.name,
        upstream = %config.url,
        timeout = ?config.timeout,
        policy = ?config.failure_policy,
        "configured data source"
    );

    Ok(Action::Run {
        port,
        listen,
        config,
    })
}

fn datasource_config(matches: &ArgMatches) -> Result<DatasourceConfig> {
    let url = matches
        .get_one::<String>("url")
        .ok_or_else(|| anyhow!("URL is required. Please provide it using the --url flag."))?;
    let url = Url::parse(url).with_context(|| format!("invalid collector URL: {url}"))?;

    let name = matches
        .get_one::<String>("name")
        .map_or("ambari-metrics", String::as_str);

    let mut config = DatasourceConfig::new(name, url);

    if let Some(user) = matches
        .get_one::<String>("basic-auth-user")
        .filter(|user| !user.is_empty())
    {
        let password = matches
            .get_one::<String>("basic-auth-password")
            .cloned()
            .unwrap_or_default();
        config = config.with_basic_auth(user, SecretString::from(password));
    }

    config.with_credentials = matches.get_flag("with-credentials");

    if let Some(secs) = matches.get_one::<u64>("timeout").copied() {
        config = config.with_timeout(Duration::from_secs(secs));
    }

    config.metadata_refresh_interval = matches
        .get_one::<u64>("metadata-refresh-interval")
        .copied()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

    if matches.get_flag("partial-results") {
        config = config.with_failure_policy(FailurePolicy::Partial);
    }

    Ok(config)
}
