//! Health and readiness endpoints.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, routing::get, Router};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

/// Flipped once the workload has started; never reset.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Health routes: `/healthz` and `/livez` always pass, `/readyz` waits for the workload.
pub fn router(readiness: Readiness) -> Router {
    Router::new()
        .route("/healthz", get(ok))
        .route("/livez", get(ok))
        .route("/readyz", get(readyz))
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                    .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
            ),
        )
        .with_state(readiness)
}

async fn ok() -> &'static str {
    "ok"
}

async fn readyz(State(readiness): State<Readiness>) -> (StatusCode, &'static str) {
    if readiness.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "workload not started")
    }
}

/// Normalise a Go-style listen address: `:8080` binds every interface,
/// an empty address means port 80.
pub fn listen_addr(addr: &str) -> String {
    if addr.is_empty() {
        "0.0.0.0:80".to_string()
    } else if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

/// Serve the health endpoints on `addr` until `cancel` fires.
pub async fn serve(addr: &str, readiness: Readiness, cancel: CancellationToken) -> Result<()> {
    let addr = listen_addr(addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, router(readiness))
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            info!("Shutting down http service...");
        })
        .await
        .context("http server")
}
