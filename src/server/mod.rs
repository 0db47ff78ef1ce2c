//! HTTP front end exposing the data source to the dashboarding host.

mod error;
mod handlers;

pub use error::ApiError;

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, header},
    routing::{get, post},
};
use prometheus::Registry;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, warn};
use ulid::Ulid;

use crate::datasource::{AmbariMetricsDatasource, DatasourceConfig, UpstreamMetrics};

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub datasource: Arc<AmbariMetricsDatasource>,
    pub registry: Registry,
}

#[derive(Clone, Copy, Default)]
struct MakeRequestUlid;

impl MakeRequestId for MakeRequestUlid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = HeaderValue::from_str(&Ulid::new().to_string()).ok()?;
        Some(RequestId::new(id))
    }
}

fn cors(with_credentials: bool) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if with_credentials {
        // credentials cannot be combined with a wildcard origin
        layer
            .allow_origin(AllowOrigin::mirror_request())
            .allow_credentials(true)
    } else {
        layer.allow_origin(Any)
    }
}

/// Browser callers may send credentials when asked to, or when the
/// upstream itself needs basic auth.
fn allow_credentials(config: &DatasourceConfig) -> bool {
    config.with_credentials || config.basic_auth.is_some()
}

/// Build the router with all routes and middleware.
pub fn router(state: AppState, with_credentials: bool) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUlid))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                info_span!(
                    "http.request",
                    http.method = %request.method(),
                    url.path = %request.uri().path(),
                    request_id = %request_id,
                    otel.kind = "server"
                )
            }),
        )
        .layer(PropagateRequestIdLayer::new(request_id))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::SERVER,
            HeaderValue::from_static(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))),
        ))
        .layer(cors(with_credentials));

    Router::new()
        .route("/", get(handlers::test_datasource))
        .route("/query", post(handlers::query))
        .route("/search", post(handlers::search))
        .route("/suggest/apps", get(handlers::suggest_apps))
        .route("/suggest/metrics", get(handlers::suggest_metrics))
        .route("/suggest/hosts", get(handlers::suggest_hosts))
        .route("/aggregators", get(handlers::aggregators))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware)
        .with_state(state)
}

/// Bind `listen:port`, or `[::]:port` falling back to `0.0.0.0:port` when
/// no address is given.
///
/// # Errors
///
/// Returns an error if the address is invalid or cannot be bound.
pub async fn bind(port: u16, listen: Option<&str>) -> Result<TcpListener> {
    if let Some(addr) = listen {
        let ip: IpAddr = addr
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .with_context(|| format!("invalid listen address: {addr}"))?;
        let socket = SocketAddr::new(ip, port);
        return TcpListener::bind(socket)
            .await
            .with_context(|| format!("failed to bind {socket}"));
    }

    let v6 = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port);
    match TcpListener::bind(v6).await {
        Ok(listener) => Ok(listener),
        Err(e) => {
            warn!(error = %e, "IPv6 bind failed, falling back to IPv4");
            let v4 = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
            TcpListener::bind(v4)
                .await
                .with_context(|| format!("failed to bind {v4}"))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received");
}

/// Start the data source server and run until a shutdown signal.
///
/// # Errors
///
/// Returns an error if the data source cannot be created, metrics cannot be
/// registered, or the server fails to bind or serve.
pub async fn new(port: u16, listen: Option<String>, config: DatasourceConfig) -> Result<()> {
    let registry = Registry::new();
    let metrics = UpstreamMetrics::new();
    metrics.register(&registry)?;

    let datasource = AmbariMetricsDatasource::connect(&config, metrics)?;
    let state = AppState {
        datasource,
        registry,
    };

    let listener = bind(port, listen.as_deref()).await?;
    info!(
        address = %listener.local_addr()?,
        datasource = %config.name,
        upstream = %config.url,
        "listening"
    );

    axum::serve(listener, router(state, allow_credentials(&config)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}
