//! Radio-type specific shaping of engine input and output.
//!
//! Digital calls carry a source list, so the engine prompt is seeded from
//! per-radio prompt words and every output segment is attributed back to the
//! radio closest to its start time. Analog calls have no per-radio signal;
//! their transcripts stay flat.

pub mod analog;
pub mod digital;

use trunkscribe_transcript::TranscriptError;
use trunkscribe_whisper::{CleanupRule, DecodeOptions, WhisperError};

#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    #[error(transparent)]
    Whisper(#[from] WhisperError),
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
    #[error("digital call has no sources")]
    NoSources,
}

impl RadioError {
    /// Terminal for this call: retrying the engine cannot make it valid.
    pub fn is_terminal(&self) -> bool {
        match self {
            RadioError::Whisper(err) => err.is_terminal(),
            RadioError::Transcript(_) | RadioError::NoSources => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, RadioError>;

/// Per-audio-type shaping knobs, resolved once at worker startup.
#[derive(Debug, Clone, Default)]
pub struct ShaperConfig {
    pub vad_filter: bool,
    pub decode: DecodeOptions,
    pub cleanup_config: Vec<CleanupRule>,
}
