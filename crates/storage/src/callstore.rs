//! Thin client for the relational call store's HTTP surface.
//!
//! The store itself is an external collaborator; the worker only performs a
//! partial update keyed by the integer call id.

use std::time::Duration;

use trunkscribe_metadata::GeoResponse;
use trunkscribe_transcript::Transcript;

use crate::Result;

pub struct CallStoreClient {
    client: reqwest::Client,
    base_url: String,
}

impl CallStoreClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Write the finished transcript (raw + plaintext) onto the call row.
    pub async fn update_transcript(
        &self,
        id: i64,
        transcript: &Transcript,
        geo: Option<&GeoResponse>,
    ) -> Result<()> {
        let mut body = serde_json::json!({
            "raw_transcript": transcript.segments(),
            "transcript_plaintext": transcript.txt(),
        });
        if let Some(geo) = geo {
            body["geo"] = serde_json::json!(geo);
        }

        self.client
            .patch(format!("{}/calls/{id}", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
