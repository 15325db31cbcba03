use std::time::Duration;

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::Result;

/// One in-flight message. Holding a `Delivery` means the message sits in the
/// consumer's processing list until it is acked or nacked.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: String,
    pub consumer: String,
    pub envelope: Envelope,
    /// The exact payload string held in the processing list; removal is
    /// byte-for-byte.
    pub(crate) raw: String,
}

/// At-least-once queue broker contract.
///
/// The broker is the only inter-process coordination primitive: workers
/// consume and heartbeat, the intake publishes, the autoscaler reads
/// consumer names.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, queue: &str, envelope: &Envelope) -> Result<()>;

    /// Wait briefly for a message on `queue`; `None` means the wait timed
    /// out and the caller should poll its other queues. A returned message
    /// has already been moved into this consumer's processing list.
    async fn consume(&self, queue: &str, consumer: &str) -> Result<Option<Delivery>>;

    /// Drop the message for good. Call only after all per-job effects are
    /// durable.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Return the message to the queue with backoff applied.
    async fn nack(&self, delivery: &Delivery, retry_at: i64) -> Result<()>;

    async fn queue_depth(&self, queue: &str) -> Result<u64>;

    /// Refresh this consumer's liveness record; expires after
    /// [`Broker::heartbeat_ttl`].
    async fn heartbeat(&self, queue: &str, consumer: &str) -> Result<()>;

    /// Hostnames of consumers with a live heartbeat on `queue`.
    async fn list_consumers(&self, queue: &str) -> Result<Vec<String>>;

    fn heartbeat_ttl(&self) -> Duration {
        Duration::from_secs(30)
    }
}
