//! Deepgram prerecorded-audio API.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::API_TIMEOUT_SECS;
use crate::engine::WhisperEngine;
use crate::types::{TranscribeOptions, WhisperResult, WhisperSegment};
use crate::Result;

const LISTEN_URL: &str = "https://api.deepgram.com/v1/listen";

pub struct DeepgramApi {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl DeepgramApi {
    pub fn new(api_key: String, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: model.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Utterance {
    start: f64,
    end: f64,
    #[serde(default)]
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Default, Deserialize)]
struct Results {
    #[serde(default)]
    utterances: Option<Vec<Utterance>>,
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct ListenResponse {
    #[serde(default)]
    results: Option<Results>,
}

#[async_trait]
impl WhisperEngine for DeepgramApi {
    async fn transcribe(
        &self,
        audio: &Path,
        options: &TranscribeOptions,
        language: &str,
    ) -> Result<WhisperResult> {
        let bytes = tokio::fs::read(audio).await?;

        let mut query: Vec<(&str, String)> = vec![
            ("model", self.model.clone()),
            ("utterances", "true".into()),
            ("smart_format", "true".into()),
            ("language", language.to_string()),
        ];
        if !options.initial_prompt.is_empty() {
            query.push(("keywords", options.initial_prompt.clone()));
        }

        let response: ListenResponse = self
            .client
            .post(LISTEN_URL)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .query(&query)
            .body(bytes)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let results = response.results.unwrap_or_default();
        match (results.utterances, results.channels.first()) {
            (Some(utterances), Some(channel)) if !utterances.is_empty() => Ok(WhisperResult {
                text: channel
                    .alternatives
                    .first()
                    .map(|alternative| alternative.transcript.clone())
                    .unwrap_or_default(),
                segments: utterances
                    .into_iter()
                    .map(|utterance| WhisperSegment {
                        start: utterance.start,
                        end: utterance.end,
                        text: utterance.transcript,
                    })
                    .collect(),
                language: Some(language.to_string()),
            }),
            // No utterances means no speech was found; that is an empty
            // result, not a failure.
            _ => Ok(WhisperResult::empty(language)),
        }
    }
}
