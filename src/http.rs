//! `/metrics` over HTTP for Prometheus scrapes.

use std::net::SocketAddr;

use axum::{Router, routing::get};
use tracing::{error, info};

pub fn router() -> Router {
    Router::new().route("/metrics", get(|| async { crate::metrics::gather_metrics() }))
}

/// Serve the metrics router on every interface until the process exits.
/// A bind failure is logged and leaves the daemon running without it.
pub async fn run_http_server(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "metrics endpoint failed to bind");
            return;
        }
    };
    info!(%addr, "metrics endpoint listening");
    if let Err(e) = axum::serve(listener, router()).await {
        error!(error = %e, "metrics endpoint stopped");
    }
}
