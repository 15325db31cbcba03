//! Notification fan-out.
//!
//! Channels are opaque webhook URIs; keyword and location matching happens
//! receiver-side. Delivery is best-effort: the call is already durable and
//! searchable by the time notifications fire, so failures are logged and
//! dropped rather than retried.

use std::env;
use std::time::Duration;

use serde::Serialize;
use trunkscribe_metadata::{GeoResponse, Metadata};
use trunkscribe_transcript::Transcript;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, NotifyError>;

#[derive(Debug, Serialize)]
pub struct NotificationPayload<'a> {
    pub transcript: String,
    pub transcript_markdown: String,
    pub metadata: &'a Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<&'a GeoResponse>,
    pub raw_audio_url: &'a str,
    pub search_url: &'a str,
}

impl<'a> NotificationPayload<'a> {
    pub fn new(
        transcript: &Transcript,
        metadata: &'a Metadata,
        geo: Option<&'a GeoResponse>,
        raw_audio_url: &'a str,
        search_url: &'a str,
    ) -> Self {
        Self {
            transcript: transcript.txt(),
            transcript_markdown: transcript.markdown(),
            metadata,
            geo,
            raw_audio_url,
            search_url,
        }
    }
}

pub struct NotificationClient {
    client: reqwest::Client,
    channels: Vec<String>,
}

impl NotificationClient {
    pub fn new(channels: Vec<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, channels })
    }

    /// Channels from `NOTIFICATION_URLS` (comma-separated; empty = disabled).
    pub fn from_env() -> Result<Self> {
        let channels = env::var("NOTIFICATION_URLS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|channel| !channel.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(channels)
    }

    pub fn is_enabled(&self) -> bool {
        !self.channels.is_empty()
    }

    /// POST the payload to every channel; per-channel failures are logged.
    pub async fn send(&self, payload: &NotificationPayload<'_>) {
        for channel in &self.channels {
            let delivery = self
                .client
                .post(channel)
                .json(payload)
                .send()
                .await
                .and_then(|response| response.error_for_status());
            if let Err(err) = delivery {
                tracing::warn!(channel, %err, "notification delivery failed");
            }
        }
    }
}
