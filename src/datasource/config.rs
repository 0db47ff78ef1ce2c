use secrecy::SecretString;
use std::time::Duration;
use url::Url;

pub const DEFAULT_URL: &str = "http://localhost:6188";
pub const DEFAULT_NAME: &str = "ambari-metrics";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// What a query does when one of its series requests fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Any failed request fails the whole query.
    #[default]
    AllOrNothing,
    /// A failed request becomes an empty series plus an error entry.
    Partial,
}

#[derive(Debug)]
pub struct BasicAuth {
    pub user: String,
    pub password: SecretString,
}

/// Settings for one metrics-service data source.
#[derive(Debug)]
pub struct DatasourceConfig {
    pub name: String,
    pub url: Url,
    pub basic_auth: Option<BasicAuth>,
    /// Let browser callers send credentials cross-origin.
    pub with_credentials: bool,
    pub timeout: Duration,
    pub failure_policy: FailurePolicy,
    /// Re-fetch metadata on this period; `None` fetches once at startup.
    pub metadata_refresh_interval: Option<Duration>,
}

impl Default for DatasourceConfig {
    #[allow(clippy::expect_used)]
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            url: Url::parse(DEFAULT_URL).expect("valid default URL"),
            basic_auth: None,
            with_credentials: false,
            timeout: DEFAULT_TIMEOUT,
            failure_policy: FailurePolicy::default(),
            metadata_refresh_interval: None,
        }
    }
}

impl DatasourceConfig {
    #[must_use]
    pub fn new(name: &str, url: Url) -> Self {
        Self {
            name: name.to_string(),
            url,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_basic_auth(mut self, user: &str, password: SecretString) -> Self {
        self.basic_auth = Some(BasicAuth {
            user: user.to_string(),
            password,
        });
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DatasourceConfig::default();
        assert_eq!(config.name, "ambari-metrics");
        assert_eq!(config.url.as_str(), "http://localhost:6188/");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.failure_policy, FailurePolicy::AllOrNothing);
        assert!(config.basic_auth.is_none());
        assert!(config.metadata_refresh_interval.is_none());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_config_builders() {
        let config = DatasourceConfig::new("ams", Url::parse("http://ams:6188").unwrap())
            .with_basic_auth("admin", SecretString::from("admin"))
            .with_timeout(Duration::from_secs(5))
            .with_failure_policy(FailurePolicy::Partial);

        assert_eq!(config.name, "ams");
        assert_eq!(config.basic_auth.map(|a| a.user), Some("admin".to_string()));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.failure_policy, FailurePolicy::Partial);
    }
}
