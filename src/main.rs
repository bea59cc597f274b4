//! Prime Activity Listener: binary entrypoint.
//! Loads configuration, wires the Prime feed to the SNS topic, and runs the
//! listener until SIGINT/SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use prime_activity_listener::broadcast::sns::SnsPublisher;
use prime_activity_listener::config::app::ENV_NAME;
use prime_activity_listener::config::{is_local_env, AppConfig};
use prime_activity_listener::listen::providers::prime::PrimeActivitySource;
use prime_activity_listener::listen::ActivityListener;
use prime_activity_listener::metrics::Metrics;

const SERVICE: &str = "prime-activities";

/// JSON logs everywhere except `ENV_NAME=local`, which gets compact human output.
fn init_tracing() {
    let local = is_local_env(std::env::var(ENV_NAME).ok().as_deref());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if local {
        registry.with(fmt::layer().compact()).init();
    } else {
        registry.with(fmt::layer().json()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; variables already set in the environment win.
    let _ = dotenvy::dotenv();

    init_tracing();
    info!(state = "starting", "{SERVICE}");

    let cfg = AppConfig::from_env().context("cannot setup app config")?;

    let metrics = Metrics::init(cfg.cache_capacity)?;
    let _metrics_task = match cfg.metrics_addr {
        Some(addr) => Some(metrics.serve(addr).await?),
        None => None,
    };

    let http = cfg.http.build_client().context("cannot init the http client")?;
    let source = PrimeActivitySource::new(
        http,
        cfg.prime_api_url.clone(),
        cfg.prime_credentials.clone(),
    )
    .with_header_timeout(cfg.http.response_header_timeout);
    let sink = SnsPublisher::new(&cfg.aws_region, cfg.activity_topic_arn.clone()).await;

    let mut listener = ActivityListener::spawn(
        cfg.listener_config(),
        Arc::new(source),
        Arc::new(sink),
    )
    .context("cannot start the activity listener")?;

    info!(state = "started", "{SERVICE}");

    shutdown_signal().await;

    info!(state = "stopping", "{SERVICE}");

    if let Err(e) = listener.stop().await {
        error!(error = %e, "process did not stop cleanly");
    }

    info!(state = "stopped", "{SERVICE}");
    Ok(())
}
