//! Broker telemetry consumed by the autoscaler.
//!
//! The management endpoint speaks the RabbitMQ-management JSON shape
//! (`consumers`, `messages`, `messages_details.rate`,
//! `message_stats.ack_details.rate`), which Flower-style proxies also serve
//! for other brokers.

use std::time::Duration;

use serde::Deserialize;

use crate::Result;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RateDetails {
    #[serde(default)]
    pub rate: f64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct MessageStats {
    #[serde(default)]
    pub ack_details: RateDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueStatus {
    #[serde(default)]
    pub consumers: u64,
    #[serde(default)]
    pub messages: u64,
    #[serde(default)]
    pub messages_details: Option<RateDetails>,
    #[serde(default)]
    pub message_stats: Option<MessageStats>,
}

impl QueueStatus {
    /// Instantaneous ingress rate (messages per second; negative = draining).
    pub fn message_rate(&self) -> f64 {
        self.messages_details.map(|details| details.rate).unwrap_or(0.0)
    }

    /// Acknowledgement rate across all consumers.
    pub fn ack_rate(&self) -> f64 {
        self.message_stats
            .map(|stats| stats.ack_details.rate)
            .unwrap_or(0.0)
    }
}

pub struct TelemetryClient {
    client: reqwest::Client,
    base_url: String,
}

impl TelemetryClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    /// Fetch the status of one queue on the default vhost.
    pub async fn queue_status(&self, queue: &str) -> Result<QueueStatus> {
        let url = format!("{}queues/%2F/{queue}", self.base_url);
        let status = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(status)
    }
}
