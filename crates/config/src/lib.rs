//! Process-wide configuration, read from the environment once at startup.

use std::env;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} env must be set")]
    Missing(&'static str),
    #[error("{0} has an invalid value: {1}")]
    Invalid(&'static str, String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

pub fn required(name: &'static str) -> Result<String> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

pub fn optional(name: &str) -> Option<String> {
    env::var(name).ok()
}

/// `true` iff the variable is set to the literal `true` (case-insensitive).
pub fn flag(name: &str) -> bool {
    env::var(name)
        .map(|value| value.to_lowercase() == "true")
        .unwrap_or(false)
}

/// Intake rejection floor in seconds; calls shorter than this never enter
/// the queue.
pub fn min_call_length() -> f64 {
    optional("MIN_CALL_LENGTH")
        .and_then(|value| value.parse().ok())
        .unwrap_or(2.0)
}

/// Everything a worker process needs to bind to the broker and shape jobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub broker_url: String,
    pub queues: Vec<String>,
    pub concurrency: usize,
    pub hostname: String,
    pub api_base_url: Option<String>,
    pub vad_filter_digital: bool,
    pub vad_filter_analog: bool,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        let broker_url = required("CELERY_BROKER_URL")?;

        let queues = optional("CELERY_QUEUES")
            .unwrap_or_else(|| "transcribe,retranscribe".to_string())
            .split(',')
            .map(str::trim)
            .filter(|queue| !queue.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        if queues.is_empty() {
            return Err(ConfigError::Invalid("CELERY_QUEUES", "no queues".into()));
        }

        let concurrency = match optional("CELERY_CONCURRENCY") {
            Some(value) => value
                .parse::<usize>()
                .ok()
                .filter(|concurrency| *concurrency > 0)
                .ok_or(ConfigError::Invalid("CELERY_CONCURRENCY", value))?,
            None => std::thread::available_parallelism()
                .map(|parallelism| parallelism.get())
                .unwrap_or(1),
        };

        let hostname = optional("CELERY_HOSTNAME").unwrap_or_else(|| {
            format!(
                "worker@{}",
                optional("HOSTNAME").unwrap_or_else(|| "localhost".to_string())
            )
        });

        Ok(Self {
            broker_url,
            queues,
            concurrency,
            hostname,
            api_base_url: optional("API_BASE_URL"),
            vad_filter_digital: flag("VAD_FILTER_DIGITAL"),
            vad_filter_analog: flag("VAD_FILTER_ANALOG"),
        })
    }
}
