use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::task::JoinHandle;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and record the configured cache capacity.
    pub fn init(cache_capacity: usize) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        gauge!("listener_cache_capacity").set(cache_capacity as f64);

        Ok(Self { handle })
    }

    /// `/metrics` (Prometheus exposition format) and `/health`.
    pub fn router(&self) -> Router {
        router(self.handle.clone())
    }

    /// Serve the router on `addr` in a background task.
    pub async fn serve(&self, addr: SocketAddr) -> Result<JoinHandle<()>> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding metrics server on {addr}"))?;
        let app = self.router();

        tracing::info!(%addr, "metrics server listening");
        Ok(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "metrics server exited");
            }
        }))
    }
}

pub fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
}
