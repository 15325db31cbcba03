//! In-process inference through whisper.cpp bindings.
//!
//! The model is loaded once when the engine is constructed and lives for the
//! worker process. Inference is CPU/GPU-bound and runs on the blocking pool;
//! callers serialize access through the registry's lock.

use std::ffi::c_int;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::config::DecodeOptions;
use crate::engine::WhisperEngine;
use crate::types::{TranscribeOptions, WhisperResult, WhisperSegment};
use crate::{Result, WhisperError};

pub struct LocalWhisper {
    context: Arc<WhisperContext>,
}

impl LocalWhisper {
    pub fn new(model: &str, model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join(format!("ggml-{model}.bin"));
        let model_path = model_path
            .to_str()
            .ok_or_else(|| WhisperError::ModelLoad("non-utf8 model path".into()))?;

        let context =
            WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
                .map_err(|err| WhisperError::ModelLoad(format!("{model_path}: {err}")))?;

        Ok(Self {
            context: Arc::new(context),
        })
    }
}

/// Load the already-converted 16 kHz mono s16le wav into f32 samples.
fn read_wav_samples(path: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|err| WhisperError::Audio(format!("{}: {err}", path.display())))?;

    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(WhisperError::Audio(format!(
            "expected mono audio, got {} channels",
            spec.channels
        )));
    }

    reader
        .samples::<i16>()
        .map(|sample| {
            sample
                .map(|sample| sample as f32 / 32768.0)
                .map_err(|err| WhisperError::Audio(err.to_string()))
        })
        .collect()
}

fn run_inference(
    context: &WhisperContext,
    samples: &[f32],
    language: &str,
    initial_prompt: &str,
    decode: &DecodeOptions,
) -> Result<WhisperResult> {
    let mut state = context
        .create_state()
        .map_err(|err| WhisperError::Process(format!("failed to create whisper state: {err}")))?;

    let strategy = match decode.beam_size {
        Some(beam_size) if beam_size > 1 => SamplingStrategy::BeamSearch {
            beam_size: beam_size as c_int,
            patience: -1.0,
        },
        _ => SamplingStrategy::Greedy {
            best_of: decode.best_of.unwrap_or(1) as c_int,
        },
    };

    let mut params = FullParams::new(strategy);
    params.set_language(Some(language));
    if !initial_prompt.is_empty() {
        params.set_initial_prompt(initial_prompt);
    }
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    params.set_suppress_blank(true);

    state
        .full(params, samples)
        .map_err(|err| WhisperError::Process(format!("inference failed: {err}")))?;

    let segment_count = state
        .full_n_segments()
        .map_err(|err| WhisperError::Process(err.to_string()))?;

    let mut result = WhisperResult::empty(language);
    for i in 0..segment_count {
        let text = state
            .full_get_segment_text(i)
            .map_err(|err| WhisperError::Process(err.to_string()))?;
        let start = state
            .full_get_segment_t0(i)
            .map_err(|err| WhisperError::Process(err.to_string()))?;
        let end = state
            .full_get_segment_t1(i)
            .map_err(|err| WhisperError::Process(err.to_string()))?;
        // Timestamps come back in centiseconds.
        result.segments.push(WhisperSegment {
            start: start as f64 / 100.0,
            end: end as f64 / 100.0,
            text,
        });
    }
    result.rejoin_text();

    Ok(result)
}

#[async_trait]
impl WhisperEngine for LocalWhisper {
    async fn transcribe(
        &self,
        audio: &Path,
        options: &TranscribeOptions,
        language: &str,
    ) -> Result<WhisperResult> {
        let samples = read_wav_samples(audio)?;
        let context = self.context.clone();
        let language = language.to_string();
        let initial_prompt = options.initial_prompt.clone();
        let decode = options.decode.clone();

        tokio::task::spawn_blocking(move || {
            run_inference(&context, &samples, &language, &initial_prompt, &decode)
        })
        .await
        .map_err(|err| WhisperError::Process(format!("inference task aborted: {err}")))?
    }
}
