//! Transcription worker entry point.
//!
//! Exit codes: 0 on external shutdown, non-zero when the health check
//! requests self-termination or startup configuration is invalid.

mod health;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use trunkscribe_config::WorkerConfig;

use crate::worker::Worker;

/// Cadence for the next-month index pre-creation check.
const INDEX_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "invalid worker configuration");
            std::process::exit(2);
        }
    };

    let worker = match Worker::new(config).await {
        Ok(worker) => Arc::new(worker),
        Err(err) => {
            error!(%err, "worker startup failed");
            std::process::exit(2);
        }
    };

    worker.ensure_indexes().await;

    let maintenance = {
        let worker = worker.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(INDEX_MAINTENANCE_INTERVAL);
            loop {
                ticker.tick().await;
                worker.ensure_indexes().await;
            }
        })
    };

    tokio::select! {
        _ = worker.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }
    maintenance.abort();
}
