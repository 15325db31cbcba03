//! Call jobs and the queue broker contract.
//!
//! Delivery is at-least-once: consumers move messages into a per-consumer
//! processing list and remove them only on ack, so a crashed worker's
//! in-flight jobs stay recoverable. Duplicates are tolerated downstream
//! (call-store and index writes are idempotent by id).

mod broker;
mod envelope;
mod job;
mod redis_broker;
mod telemetry;

pub use broker::{Broker, Delivery};
pub use envelope::{backoff_secs, jittered_backoff, Envelope, BACKOFF_CAP_SECS, MAX_ATTEMPTS};
pub use job::{CallAudio, CallJob};
pub use redis_broker::RedisBroker;
pub use telemetry::{QueueStatus, TelemetryClient};

/// Primary transcription queue.
pub const TRANSCRIBE_QUEUE: &str = "transcribe";
/// Reprocessing queue; jobs here always carry a call id.
pub const RETRANSCRIBE_QUEUE: &str = "retranscribe";

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("broker error: {0}")]
    Broker(#[from] redis::RedisError),
    #[error("malformed job payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("malformed inline audio: {0}")]
    Audio(#[from] base64::DecodeError),
    #[error("telemetry request failed: {0}")]
    Telemetry(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;
