use serde::{Deserialize, Serialize};

use crate::config::{CleanupRule, DecodeOptions};

/// One engine-emitted segment; times are seconds from the start of the clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhisperSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Normalized engine output. Segments are time-ordered and non-overlapping
/// within floating-point tolerance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhisperResult {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<WhisperSegment>,
    #[serde(default)]
    pub language: Option<String>,
}

impl WhisperResult {
    pub fn empty(language: &str) -> Self {
        Self {
            text: String::new(),
            segments: Vec::new(),
            language: Some(language.to_string()),
        }
    }

    /// Rebuild `text` as the newline join of the current segments.
    pub fn rejoin_text(&mut self) {
        self.text = self
            .segments
            .iter()
            .map(|segment| segment.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
    }
}

/// Per-call transcription options, specialized by the radio-type shaper.
#[derive(Debug, Clone, Default)]
pub struct TranscribeOptions {
    pub initial_prompt: String,
    pub vad_filter: bool,
    pub cleanup: bool,
    pub decode: DecodeOptions,
    pub cleanup_config: Vec<CleanupRule>,
}
