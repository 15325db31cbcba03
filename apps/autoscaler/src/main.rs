//! GPU fleet autoscaler entry point.
//!
//! Exits 0 only on external signal; single API failures never stop the loop.

mod scaler;
mod vast;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::scaler::{
    Autoscaler, Options, DEFAULT_INTERVAL_SECS, DEFAULT_MAX_INSTANCES, DEFAULT_MIN_INSTANCES,
};

#[derive(Debug, thiserror::Error)]
pub enum ScalerError {
    #[error("marketplace request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("broker error: {0}")]
    Queue(#[from] trunkscribe_queue::QueueError),
    #[error("image resolution failed: {0}")]
    Image(String),
    #[error("missing configuration: {0}")]
    Config(String),
    #[error("unknown whisper model: {0}")]
    UnknownModel(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScalerError>;

/// Rent and release GPU workers based on queue pressure.
#[derive(Debug, Parser)]
#[command(name = "autoscaler")]
struct Args {
    /// Enable verbose logging.
    #[arg(long)]
    verbose: bool,

    /// Minimum number of worker instances.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MIN_INSTANCES)]
    min_instances: u32,

    /// Maximum number of worker instances.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_INSTANCES)]
    max_instances: u32,

    /// Interval of the scaling loop in seconds.
    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
    interval: u64,

    /// Container image to run on rented instances.
    #[arg(long)]
    image: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if args.verbose { "debug" } else { "info" })
        }))
        .init();

    let options = Options {
        min: args.min_instances,
        max: args.max_instances,
        interval_secs: args.interval,
        image: args.image,
    };

    let autoscaler = match Autoscaler::new(options).await {
        Ok(autoscaler) => autoscaler,
        Err(err) => {
            error!(%err, "autoscaler startup failed");
            std::process::exit(2);
        }
    };

    tokio::select! {
        _ = autoscaler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }
}
