//! Relay gateway: a stateless HTTP pass-through for capture submissions.
//!
//! The caller's `Authorization` header is forwarded untouched and the
//! backend's status is mirrored back.

use crate::{backend::BackendConfig, APP_USER_AGENT};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Extension, Router,
};
use reqwest::Client;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, error, info, Span};
use ulid::Ulid;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// Backend path mirrored by `POST /api/capture`.
pub const CAPTURE_PATH: &str = "/auth/capture";

#[derive(Debug, Clone)]
pub struct RelayState {
    client: Client,
    capture_url: String,
}

impl RelayState {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            capture_url: config.endpoint(CAPTURE_PATH),
        })
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn capture_url(&self) -> &str {
        &self.capture_url
    }
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/api/capture", post(handlers::capture))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
        .route("/health", get(handlers::health).options(handlers::health))
}

/// Serve the relay until Ctrl-C.
///
/// # Errors
/// Returns an error if the server fails to start
pub async fn new(port: u16, config: BackendConfig) -> Result<()> {
    let state = RelayState::new(&config)?;

    info!("Relaying capture submissions to {}", state.capture_url());

    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {err}");
    }
    info!("Gracefully shutdown");
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let path = request.uri().path();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    // Headers are left out: they carry the caller's bearer token.
    debug_span!("http-request", path, request_id)
}
