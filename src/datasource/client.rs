use anyhow::{Context, Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use opentelemetry::global;
use opentelemetry_http::HeaderInjector;
use reqwest::{
    StatusCode,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{Span, debug, instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt as _;
use url::Url;

use super::config::{BasicAuth, DatasourceConfig};
use super::request;
use super::upstream::UpstreamMetrics;

/// Build the `Authorization` header value for basic auth.
///
/// # Errors
///
/// Returns an error if the encoded credentials are not a valid header value.
pub fn basic_auth_header(auth: &BasicAuth) -> Result<HeaderValue> {
    let encoded = STANDARD.encode(format!("{}:{}", auth.user, auth.password.expose_secret()));
    let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))
        .context("basic auth credentials are not a valid header value")?;
    value.set_sensitive(true);
    Ok(value)
}

/// HTTP client for the metrics service timeline API.
#[derive(Clone)]
pub struct AmsClient {
    http: reqwest::Client,
    base: String,
    authorization: Option<HeaderValue>,
    metrics: UpstreamMetrics,
}

impl AmsClient {
    /// Create a client for the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the credentials
    /// cannot be encoded.
    pub fn new(config: &DatasourceConfig, metrics: UpstreamMetrics) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        let authorization = config.basic_auth.as_ref().map(basic_auth_header).transpose()?;

        Ok(Self {
            http,
            base: config.url.as_str().trim_end_matches('/').to_string(),
            authorization,
            metrics,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base
    }

    #[must_use]
    pub const fn metrics(&self) -> &UpstreamMetrics {
        &self.metrics
    }

    /// Resolve a timeline API path against the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        request::endpoint(&self.base, path)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(auth) = &self.authorization {
            headers.insert(AUTHORIZATION, auth.clone());
        }

        let cx = Span::current().context();
        global::get_text_map_propagator(|propagator| {
            propagator.inject_context(&cx, &mut HeaderInjector(&mut headers));
        });

        headers
    }

    async fn send(&self, url: Url) -> Result<reqwest::Response> {
        self.http
            .get(url)
            .headers(self.headers())
            .send()
            .await
            .map_err(anyhow::Error::from)
    }

    /// GET `url` and decode the JSON body.
    ///
    /// `endpoint` labels the request in logs and self-metrics.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, timeout, a non-success status,
    /// or a body that does not decode as `T`.
    #[instrument(skip(self, url), level = "debug", err, fields(otel.kind = "client", http.method = "GET", url.full = %url))]
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &'static str, url: Url) -> Result<T> {
        let timer = self.metrics.start_request(endpoint);

        let result = async {
            let response = self
                .send(url.clone())
                .await
                .with_context(|| format!("request to {endpoint} endpoint failed"))?;

            let status = response.status();
            if !status.is_success() {
                return Err(anyhow!("{endpoint} endpoint returned {status}"));
            }

            response
                .json::<T>()
                .await
                .with_context(|| format!("invalid JSON from {endpoint} endpoint"))
        }
        .await;

        match result {
            Ok(body) => {
                debug!(endpoint, "upstream request succeeded");
                timer.success();
                Ok(body)
            }
            Err(e) => {
                timer.error();
                Err(e)
            }
        }
    }

    /// GET `url` and return only the status code.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or timeout.
    #[instrument(skip(self, url), level = "debug", err, fields(otel.kind = "client", http.method = "GET", url.full = %url))]
    pub async fn probe(&self, endpoint: &'static str, url: Url) -> Result<StatusCode> {
        let timer = self.metrics.start_request(endpoint);
        match self.send(url).await {
            Ok(response) => {
                timer.success();
                Ok(response.status())
            }
            Err(e) => {
                timer.error();
                Err(e.context(format!("request to {endpoint} endpoint failed")))
            }
        }
    }
}
