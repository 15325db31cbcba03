//! Remote whisper-asr-webservice style HTTP backend.
//!
//! The service already returns the normalized result shape, so the JSON body
//! is used verbatim.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use super::API_TIMEOUT_SECS;
use crate::engine::WhisperEngine;
use crate::types::{TranscribeOptions, WhisperResult};
use crate::Result;

pub struct WhisperAsrApi {
    client: reqwest::Client,
    base_url: String,
}

impl WhisperAsrApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl WhisperEngine for WhisperAsrApi {
    async fn transcribe(
        &self,
        audio: &Path,
        options: &TranscribeOptions,
        language: &str,
    ) -> Result<WhisperResult> {
        let bytes = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        let form = reqwest::multipart::Form::new().part(
            "audio_file",
            reqwest::multipart::Part::bytes(bytes).file_name(file_name),
        );

        let result = self
            .client
            .post(format!("{}/asr", self.base_url))
            .query(&[
                ("encode", "true"),
                ("task", "transcribe"),
                ("language", language),
                ("initial_prompt", options.initial_prompt.as_str()),
                ("vad_filter", if options.vad_filter { "true" } else { "false" }),
                ("word_timestamps", "false"),
                ("output", "json"),
            ])
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(result)
    }
}
