//! Prometheus endpoint on the configured address.

use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use eyre::WrapErr;
use quill_telemetry::Telemetry;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Serve `GET /metrics` until cancellation.
pub async fn serve(address: &str, cancel: &CancellationToken) -> eyre::Result<()> {
    let addr: SocketAddr = address
        .parse()
        .wrap_err_with(|| format!("invalid metrics address {address:?}"))?;

    let app = Router::new().route("/metrics", get(metrics_text));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding metrics endpoint on {addr}"))?;
    info!(target: "quill::metrics", %addr, "serving metrics");

    let cancel = cancel.clone();
    tokio::spawn(async move {
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await });
        if let Err(error) = server.await {
            error!(target: "quill::metrics", %error, "metrics server failed");
        }
    });
    Ok(())
}

async fn metrics_text() -> String {
    Telemetry::global().encode_metrics()
}
