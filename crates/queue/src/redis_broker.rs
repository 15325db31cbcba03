//! Redis list binding for the broker contract.
//!
//! Layout per queue:
//!   `<queue>`                         pending messages (LPUSH / BLMOVE)
//!   `<queue>:processing:<consumer>`   in-flight messages for one consumer
//!   `<queue>:consumers:<consumer>`    heartbeat key with TTL

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Direction};

use crate::broker::{Broker, Delivery};
use crate::envelope::Envelope;
use crate::Result;

const CONSUME_BLOCK_SECS: f64 = 5.0;
const HEARTBEAT_TTL_SECS: u64 = 30;

pub struct RedisBroker {
    manager: ConnectionManager,
}

impl RedisBroker {
    pub async fn connect(broker_url: &str) -> Result<Self> {
        let client = redis::Client::open(broker_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }

    fn processing_key(queue: &str, consumer: &str) -> String {
        format!("{queue}:processing:{consumer}")
    }

    fn consumer_key(queue: &str, consumer: &str) -> String {
        format!("{queue}:consumers:{consumer}")
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, queue: &str, envelope: &Envelope) -> Result<()> {
        let payload = serde_json::to_string(envelope)?;
        let mut conn = self.manager.clone();
        let _: () = conn.lpush(queue, payload).await?;
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer: &str) -> Result<Option<Delivery>> {
        let processing = Self::processing_key(queue, consumer);
        let mut conn = self.manager.clone();

        let raw: Option<String> = conn
            .blmove(
                queue,
                &processing,
                Direction::Right,
                Direction::Left,
                CONSUME_BLOCK_SECS,
            )
            .await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let envelope: Envelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                // A payload nobody can parse would bounce forever; drop it.
                tracing::error!(queue, %err, "discarding unparseable message");
                let _: () = conn.lrem(&processing, 1, &raw).await?;
                return Ok(None);
            }
        };

        // Delayed redelivery: push scheduled messages back and let the
        // caller come around again.
        if let Some(not_before) = envelope.not_before {
            if not_before > now_epoch_secs() {
                let _: () = conn.lrem(&processing, 1, &raw).await?;
                let _: () = conn.lpush(queue, &raw).await?;
                tokio::time::sleep(Duration::from_secs(1)).await;
                return Ok(None);
            }
        }

        Ok(Some(Delivery {
            queue: queue.to_string(),
            consumer: consumer.to_string(),
            envelope,
            raw,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let processing = Self::processing_key(&delivery.queue, &delivery.consumer);
        let mut conn = self.manager.clone();
        let _: () = conn.lrem(&processing, 1, &delivery.raw).await?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, retry_at: i64) -> Result<()> {
        let mut retried = delivery.envelope.clone();
        retried.attempts += 1;
        retried.not_before = Some(retry_at);

        let payload = serde_json::to_string(&retried)?;
        let processing = Self::processing_key(&delivery.queue, &delivery.consumer);
        let mut conn = self.manager.clone();
        let _: () = conn.lpush(&delivery.queue, payload).await?;
        let _: () = conn.lrem(&processing, 1, &delivery.raw).await?;
        Ok(())
    }

    async fn queue_depth(&self, queue: &str) -> Result<u64> {
        let mut conn = self.manager.clone();
        Ok(conn.llen(queue).await?)
    }

    async fn heartbeat(&self, queue: &str, consumer: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(Self::consumer_key(queue, consumer), 1, HEARTBEAT_TTL_SECS)
            .await?;
        Ok(())
    }

    async fn list_consumers(&self, queue: &str) -> Result<Vec<String>> {
        let prefix = format!("{queue}:consumers:");
        let mut conn = self.manager.clone();
        let mut keys = conn.scan_match::<String, String>(format!("{prefix}*")).await?;

        let mut consumers = Vec::new();
        while let Some(key) = keys.next_item().await {
            if let Some(consumer) = key.strip_prefix(&prefix) {
                consumers.push(consumer.to_string());
            }
        }
        Ok(consumers)
    }

    fn heartbeat_ttl(&self) -> Duration {
        Duration::from_secs(HEARTBEAT_TTL_SECS)
    }
}

fn now_epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
