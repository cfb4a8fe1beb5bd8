// Path: crates/http-store-gateway/src/lib.rs
#![forbid(unsafe_code)]

//! HTTP surface of the Haven node.
//!
//! Four routes: `POST /` takes signed command envelopes and returns signed
//! receipt envelopes, `PUT /blob/{digest}` accepts uploads under a verified
//! ticket, `GET /blob/{digest}` serves stored bytes (with single-range
//! support), and `GET /claim/{link}` streams archived commitments. An IP
//! token bucket guards everything; panics are caught so the process never
//! dies to a request.

use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    extract::{ConnectInfo, DefaultBodyLimit, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use haven_types::error::{GateError, PresignError, StoreError};
use ipnetwork::IpNetwork;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_histogram_vec, register_int_counter_vec, HistogramVec,
    IntCounterVec,
};
use std::{
    net::{IpAddr, SocketAddr},
    str::FromStr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::watch;
use tower::{
    limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer, BoxError,
    ServiceBuilder,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

mod routes;

pub use routes::GatewayState;

// --- Metrics (local to gateway) ---
static GATEWAY_REQ_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static GATEWAY_REQ_LATENCY: OnceCell<HistogramVec> = OnceCell::new();

static INSTALL_METRICS: std::sync::Once = std::sync::Once::new();

/// Installs the gateway's Prometheus collectors. Safe to call more than
/// once; only the first call registers.
pub fn install_gateway_metrics() {
    INSTALL_METRICS.call_once(install_metrics_inner);
}

fn install_metrics_inner() {
    let _ = GATEWAY_REQ_TOTAL.set(
        register_int_counter_vec!(
            "haven_gateway_requests_total",
            "Total HTTP gateway requests",
            &["route", "result"]
        )
        .expect("register_int_counter_vec"),
    );
    let _ = GATEWAY_REQ_LATENCY.set(
        register_histogram_vec!(
            "haven_gateway_request_duration_seconds",
            "Latency of HTTP gateway requests (seconds)",
            &["route", "result"],
            exponential_buckets(0.001, 2.0, 15).expect("buckets")
        )
        .expect("register_histogram_vec"),
    );
}

pub(crate) fn observe(route: &str, result: &str, started: Instant) {
    if let (Some(total), Some(latency)) = (GATEWAY_REQ_TOTAL.get(), GATEWAY_REQ_LATENCY.get()) {
        total.with_label_values(&[route, result]).inc();
        latency
            .with_label_values(&[route, result])
            .observe(started.elapsed().as_secs_f64());
    }
}

// --- Error Handling ---

/// Gateway-level failures mapped onto HTTP statuses.
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound,
    Conflict(String),
    RangeNotSatisfiable { size: u64 },
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg, code) = match self {
            AppError::BadRequest(s) => (StatusCode::BAD_REQUEST, s, "INVALID_REQUEST"),
            AppError::Unauthorized(s) => (StatusCode::UNAUTHORIZED, s, "UNAUTHORIZED"),
            AppError::Forbidden(s) => (StatusCode::FORBIDDEN, s, "FORBIDDEN"),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string(), "NOT_FOUND"),
            AppError::Conflict(s) => (StatusCode::CONFLICT, s, "DATA_INCONSISTENT"),
            AppError::RangeNotSatisfiable { size } => {
                return (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    [(header::CONTENT_RANGE, format!("bytes */{size}"))],
                )
                    .into_response();
            }
            AppError::Internal(s) => {
                tracing::error!(target: "http-gateway", "internal error: {s}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    "INTERNAL_ERROR",
                )
            }
        };
        (
            status,
            Json(serde_json::json!({ "error": {"code": code, "message": msg} })),
        )
            .into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound,
            StoreError::DataInconsistent { .. } => AppError::Conflict(e.to_string()),
            StoreError::RangeNotSatisfiable { size, .. } => {
                AppError::RangeNotSatisfiable { size }
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<PresignError> for AppError {
    fn from(e: PresignError) -> Self {
        match e {
            PresignError::SignatureInvalid | PresignError::Expired => {
                AppError::Unauthorized(e.to_string())
            }
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

// --- Rate Limiter ---
#[derive(Clone)]
struct IpLimiter {
    buckets: Arc<DashMap<IpAddr, Bucket>>,
    rps: f64,
    burst: f64,
    trusted_proxy_cidrs: Arc<Vec<IpNetwork>>,
}
#[derive(Clone)]
struct Bucket {
    tokens: f64,
    last: Instant,
}
impl IpLimiter {
    fn new(rps: u32, burst: u32, trusted_proxy_cidrs: Arc<Vec<IpNetwork>>) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            rps: f64::from(rps),
            burst: f64::from(burst),
            trusted_proxy_cidrs,
        }
    }
    fn client_ip<B>(&self, req: &Request<B>) -> IpAddr {
        if let Some(peer_ip) = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|c| c.0.ip())
        {
            if self
                .trusted_proxy_cidrs
                .iter()
                .any(|cidr| cidr.contains(peer_ip))
            {
                if let Some(xff) = req
                    .headers()
                    .get("x-forwarded-for")
                    .and_then(|h| h.to_str().ok())
                {
                    if let Some(first) = xff.split(',').next() {
                        if let Ok(ip) = first.trim().parse::<IpAddr>() {
                            return ip;
                        }
                    }
                }
            }
            return peer_ip;
        }
        IpAddr::from([127, 0, 0, 1])
    }
    fn allow<B>(&self, req: &Request<B>) -> bool {
        let ip = self.client_ip(req);
        let now = Instant::now();
        let mut entry = self.buckets.entry(ip).or_insert_with(|| Bucket {
            tokens: self.burst,
            last: now,
        });
        let elapsed = now.duration_since(entry.last).as_secs_f64();
        entry.tokens = (entry.tokens + elapsed * self.rps).min(self.burst);
        entry.last = now;
        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

async fn rate_limit_middleware(
    State(limiter): State<IpLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if limiter.allow(&req) {
        next.run(req).await
    } else {
        (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response()
    }
}

async fn map_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(serde_json::json!({
                "error": { "code": "TIMEOUT", "message": "request timed out" }
            })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": { "code": "OVERLOADED", "message": err.to_string() }
            })),
        )
    }
}

// --- Configuration ---

/// Listener tuning for the gateway.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Socket address to bind.
    pub listen_addr: String,
    /// Token bucket refill rate per client IP.
    pub rps: u32,
    /// Token bucket burst per client IP.
    pub burst: u32,
    /// CIDRs whose `x-forwarded-for` is trusted.
    pub trusted_proxies: Vec<String>,
    /// Request body cap in bytes; keyed to the configured max blob size.
    pub body_limit: usize,
    /// Per-request deadline for command dispatch and claim reads. Blob
    /// transfers are exempt (they can legitimately run long).
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            rps: 50,
            burst: 100,
            trusted_proxies: Vec::new(),
            body_limit: haven_types::DEFAULT_MAX_BLOB_SIZE as usize + 4096,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Assembles the router over the gateway state.
pub fn router(state: Arc<GatewayState>, config: &GatewayConfig) -> Router {
    let cidrs = Arc::new(
        config
            .trusted_proxies
            .iter()
            .filter_map(|s| IpNetwork::from_str(s).ok())
            .collect(),
    );
    let limiter = IpLimiter::new(config.rps, config.burst, cidrs);

    Router::new()
        .route("/", post(routes::dispatch_handler))
        .route(
            "/blob/:digest",
            get(routes::get_blob_handler).put(routes::put_blob_handler),
        )
        .route("/claim/:link", get(routes::get_claim_handler))
        .route_layer(middleware::from_fn_with_state(
            limiter.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_middleware_error))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(256))
                .layer(TimeoutLayer::new(config.request_timeout)),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(config.body_limit))
}

/// Binds and serves the gateway until the shutdown channel fires.
pub async fn run_server(
    state: Arc<GatewayState>,
    config: GatewayConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let app = router(state, &config);
    let addr: SocketAddr = config.listen_addr.parse()?;
    tracing::info!(target: "http-gateway", "Haven gateway listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_rx.changed().await.ok();
        tracing::info!(target: "http-gateway", "shutting down gracefully");
    });

    if let Err(e) = server.await {
        tracing::error!(target: "http-gateway", error = %e, "server error");
    }
    Ok(())
}

/// Maps a gate error onto the transport-level response used when no valid
/// receipt could be produced.
pub(crate) fn gate_error_response(e: &GateError) -> AppError {
    match e {
        GateError::MalformedEnvelope(msg) => AppError::BadRequest(msg.clone()),
        other => AppError::Internal(other.to_string()),
    }
}
