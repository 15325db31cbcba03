//! OpenAI-compatible hosted transcription APIs.
//!
//! The same wire shape serves both platform.openai.com (which only offers
//! `whisper-1`) and DeepInfra's OpenAI-compatible endpoint.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::API_TIMEOUT_SECS;
use crate::engine::WhisperEngine;
use crate::types::{TranscribeOptions, WhisperResult, WhisperSegment};
use crate::Result;

const DEFAULT_PROMPT: &str = "This is a police radio dispatch transcript.";

pub struct OpenAiApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiApi {
    pub fn openai(api_key: String) -> Result<Self> {
        Self::with_base("https://api.openai.com/v1".to_string(), api_key, "whisper-1")
    }

    pub fn deepinfra(api_key: String, model: &str) -> Result<Self> {
        let base_url = std::env::var("DEEPINFRA_BASE_URL")
            .unwrap_or_else(|_| "https://api.deepinfra.com/v1/openai".to_string());
        Self::with_base(base_url, api_key, model)
    }

    fn with_base(base_url: String, api_key: String, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model: model.to_string(),
        })
    }

    /// Static preamble plus the caller's prompt words.
    fn build_prompt(initial_prompt: &str) -> String {
        let mut prompt =
            std::env::var("OPENAI_PROMPT").unwrap_or_else(|_| DEFAULT_PROMPT.to_string());
        if !initial_prompt.is_empty() {
            prompt.push_str(" The following words may appear: ");
            prompt.push_str(initial_prompt);
        }
        prompt
    }
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<VerboseSegment>,
}

#[async_trait]
impl WhisperEngine for OpenAiApi {
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

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("model", self.model.clone())
            .text("prompt", Self::build_prompt(&options.initial_prompt))
            .text("response_format", "verbose_json")
            .text("language", language.to_string());

        let response: VerboseTranscription = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(WhisperResult {
            text: response.text,
            segments: response
                .segments
                .into_iter()
                .map(|segment| WhisperSegment {
                    start: segment.start,
                    end: segment.end,
                    text: segment.text,
                })
                .collect(),
            language: response.language.or_else(|| Some(language.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_caller_words() {
        std::env::remove_var("OPENAI_PROMPT");
        assert_eq!(OpenAiApi::build_prompt(""), DEFAULT_PROMPT);
        assert_eq!(
            OpenAiApi::build_prompt("Engine 96"),
            format!("{DEFAULT_PROMPT} The following words may appear: Engine 96")
        );
    }
}
