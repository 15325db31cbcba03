use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;

use crate::backends::{DeepgramApi, LocalWhisper, OpenAiApi, WhisperAsrApi, WhisperCpp};
use crate::cleanup::cleanup_transcript;
use crate::types::{TranscribeOptions, WhisperResult};
use crate::{Result, WhisperError};

/// Uniform contract over every transcription backend.
#[async_trait]
pub trait WhisperEngine: Send + Sync {
    async fn transcribe(
        &self,
        audio: &Path,
        options: &TranscribeOptions,
        language: &str,
    ) -> Result<WhisperResult>;
}

/// Resolve the process-default `"<family>:<model>"` key from the
/// environment. Hosted families substitute well-known default models; local
/// families require `WHISPER_MODEL`.
pub fn default_implementation() -> Result<String> {
    let family = env::var("WHISPER_IMPLEMENTATION")
        .map_err(|_| WhisperError::Config("WHISPER_IMPLEMENTATION env must be set".into()))?;
    let model = env::var("WHISPER_MODEL").ok();

    let model = match family.as_str() {
        // The hosted OpenAI API only serves one transcription model.
        "openai" => "whisper-1".to_string(),
        "deepgram" => model.unwrap_or_else(|| "nova-2".to_string()),
        "deepinfra" => model.unwrap_or_else(|| "openai/whisper-large-v3-turbo".to_string()),
        "whisper-asr-api" => model.unwrap_or_else(|| "default".to_string()),
        _ => model.ok_or_else(|| WhisperError::Config("WHISPER_MODEL env must be set".into()))?,
    };

    Ok(format!("{family}:{model}"))
}

/// Per-process engine cache plus the mutex that serializes GPU-bound calls.
///
/// One model instance per key lives for the whole worker process; backends
/// that hold a loaded model are not safe for concurrent use on one GPU, so
/// callers take [`EngineRegistry::gpu_lock`] around the engine invocation.
pub struct EngineRegistry {
    engines: Mutex<HashMap<String, Arc<dyn WhisperEngine>>>,
    gpu_lock: tokio::sync::Mutex<()>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            engines: Mutex::new(HashMap::new()),
            gpu_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Serializes engine invocations within this process.
    pub fn gpu_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.gpu_lock
    }

    /// Fetch or lazily construct the engine for `implementation`.
    pub fn get(&self, implementation: &str) -> Result<Arc<dyn WhisperEngine>> {
        let mut engines = self
            .engines
            .lock()
            .expect("engine registry mutex poisoned");
        if let Some(engine) = engines.get(implementation) {
            return Ok(engine.clone());
        }

        tracing::info!(implementation, "initializing whisper engine");
        let engine = Self::initialize(implementation)?;
        engines.insert(implementation.to_string(), engine.clone());
        Ok(engine)
    }

    fn initialize(implementation: &str) -> Result<Arc<dyn WhisperEngine>> {
        let (family, model) = implementation
            .split_once(':')
            .ok_or_else(|| WhisperError::UnknownImplementation(implementation.to_string()))?;

        match family {
            "whisper-rs" => {
                let model_dir = env::var("WHISPER_MODEL_DIR")
                    .unwrap_or_else(|_| "/usr/local/lib/whisper-models".to_string());
                Ok(Arc::new(LocalWhisper::new(model, Path::new(&model_dir))?))
            }
            "whisper-cpp" => {
                let model_dir = env::var("WHISPERCPP_MODEL_DIR")
                    .unwrap_or_else(|_| "/usr/local/lib/whisper-models".to_string());
                Ok(Arc::new(WhisperCpp::new(model, Path::new(&model_dir))))
            }
            "openai" => {
                let api_key = env::var("OPENAI_API_KEY")
                    .map_err(|_| WhisperError::Config("OPENAI_API_KEY env must be set".into()))?;
                Ok(Arc::new(OpenAiApi::openai(api_key)?))
            }
            "deepinfra" => {
                let api_key = env::var("DEEPINFRA_API_KEY").map_err(|_| {
                    WhisperError::Config("DEEPINFRA_API_KEY env must be set".into())
                })?;
                Ok(Arc::new(OpenAiApi::deepinfra(api_key, model)?))
            }
            "deepgram" => {
                let api_key = env::var("DEEPGRAM_API_KEY")
                    .map_err(|_| WhisperError::Config("DEEPGRAM_API_KEY env must be set".into()))?;
                Ok(Arc::new(DeepgramApi::new(api_key, model)?))
            }
            "whisper-asr-api" => {
                let base_url = env::var("ASR_API_URL")
                    .unwrap_or_else(|_| "http://localhost:5000".to_string());
                Ok(Arc::new(WhisperAsrApi::new(&base_url)?))
            }
            other => Err(WhisperError::UnknownImplementation(other.to_string())),
        }
    }
}

/// Run one transcription: invoke the engine, delete the audio file on every
/// path, and apply cleanup when requested.
pub async fn transcribe(
    engine: &dyn WhisperEngine,
    audio: &Path,
    options: &TranscribeOptions,
    language: &str,
) -> Result<WhisperResult> {
    tracing::debug!(
        audio = %audio.display(),
        language,
        initial_prompt = %options.initial_prompt,
        vad_filter = options.vad_filter,
        "transcribing"
    );

    let started = Instant::now();
    let result = engine.transcribe(audio, options, language).await;
    if let Err(err) = tokio::fs::remove_file(audio).await {
        tracing::warn!(audio = %audio.display(), %err, "failed to remove engine input");
    }
    let result = result?;
    tracing::debug!(elapsed_secs = started.elapsed().as_secs_f64(), "transcription finished");

    if options.cleanup {
        cleanup_transcript(result, &options.cleanup_config)
    } else {
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var access is process-global, so the default-key cases run as one
    // test to avoid interleaving with each other.
    #[test]
    fn default_implementation_family_fallbacks() {
        env::remove_var("WHISPER_IMPLEMENTATION");
        env::remove_var("WHISPER_MODEL");
        assert!(matches!(
            default_implementation(),
            Err(WhisperError::Config(_))
        ));

        env::set_var("WHISPER_IMPLEMENTATION", "openai");
        env::set_var("WHISPER_MODEL", "ignored-model");
        assert_eq!(default_implementation().unwrap(), "openai:whisper-1");

        env::remove_var("WHISPER_MODEL");
        env::set_var("WHISPER_IMPLEMENTATION", "deepgram");
        assert_eq!(default_implementation().unwrap(), "deepgram:nova-2");

        env::set_var("WHISPER_IMPLEMENTATION", "deepinfra");
        assert_eq!(
            default_implementation().unwrap(),
            "deepinfra:openai/whisper-large-v3-turbo"
        );

        env::set_var("WHISPER_IMPLEMENTATION", "whisper-rs");
        assert!(matches!(
            default_implementation(),
            Err(WhisperError::Config(_))
        ));

        env::set_var("WHISPER_MODEL", "large-v3");
        assert_eq!(default_implementation().unwrap(), "whisper-rs:large-v3");

        env::remove_var("WHISPER_IMPLEMENTATION");
        env::remove_var("WHISPER_MODEL");
    }

    #[test]
    fn unknown_family_is_rejected() {
        let registry = EngineRegistry::new();
        assert!(matches!(
            registry.get("espeak:tiny"),
            Err(WhisperError::UnknownImplementation(_))
        ));
        assert!(matches!(
            registry.get("no-colon"),
            Err(WhisperError::UnknownImplementation(_))
        ));
    }
}
