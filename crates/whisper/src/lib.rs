//! Speech-to-text engine adapters.
//!
//! Every backend (hosted API, local model, subprocess) is normalized to the
//! same [`WhisperResult`] shape behind the [`WhisperEngine`] trait. A
//! per-process [`EngineRegistry`] constructs one engine per
//! `"<family>:<model>"` key and hands out the mutex that serializes GPU use.

mod backends;
mod cleanup;
mod config;
mod engine;
mod types;

pub use backends::{DeepgramApi, LocalWhisper, OpenAiApi, WhisperAsrApi, WhisperCpp};
pub use cleanup::cleanup_transcript;
pub use config::{
    load_cleanup_config, load_decode_options, CleanupAction, CleanupRule, DecodeOptions, MatchType,
};
pub use engine::{default_implementation, transcribe, EngineRegistry, WhisperEngine};
pub use types::{TranscribeOptions, WhisperResult, WhisperSegment};

#[derive(Debug, thiserror::Error)]
pub enum WhisperError {
    /// Missing credentials or required env for the selected engine family.
    /// Aborts process startup rather than being retried.
    #[error("missing configuration: {0}")]
    Config(String),
    #[error("unknown whisper implementation: {0}")]
    UnknownImplementation(String),
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("audio read failed: {0}")]
    Audio(String),
    #[error("engine request failed: {0}")]
    Api(#[from] reqwest::Error),
    #[error("engine process failed: {0}")]
    Process(String),
    #[error("engine io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine returned malformed output: {0}")]
    MalformedOutput(String),
    /// Terminal for the call: the post-processor rejected the result.
    #[error("transcript invalid, {0}")]
    TranscriptInvalid(String),
}

impl WhisperError {
    /// Errors that should abort startup instead of triggering a retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WhisperError::Config(_) | WhisperError::UnknownImplementation(_)
        )
    }

    /// Terminal for this call; retrying the engine will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WhisperError::TranscriptInvalid(_))
    }
}

pub type Result<T> = std::result::Result<T, WhisperError>;
