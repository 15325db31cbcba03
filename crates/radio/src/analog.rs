//! Analog (conventional) call path: no source attribution.

use std::path::Path;

use trunkscribe_transcript::Transcript;
use trunkscribe_whisper::{transcribe, TranscribeOptions, WhisperEngine, WhisperResult};

use crate::{Result, ShaperConfig};

pub fn build_transcribe_options(initial_prompt: &str, config: &ShaperConfig) -> TranscribeOptions {
    TranscribeOptions {
        initial_prompt: initial_prompt.to_string(),
        vad_filter: config.vad_filter,
        cleanup: true,
        decode: config.decode.clone(),
        cleanup_config: config.cleanup_config.clone(),
    }
}

/// Build a flat transcript from the non-empty trimmed segment texts.
pub fn process_response(response: &WhisperResult) -> Result<Transcript> {
    let mut transcript = Transcript::new();
    for segment in &response.segments {
        transcript.append(segment.text.trim(), None);
    }
    transcript.validate()?;

    Ok(transcript)
}

pub async fn transcribe_call(
    engine: &dyn WhisperEngine,
    audio: &Path,
    initial_prompt: &str,
    config: &ShaperConfig,
    language: &str,
) -> Result<Transcript> {
    let options = build_transcribe_options(initial_prompt, config);
    let response = transcribe(engine, audio, &options, language).await?;
    process_response(&response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trunkscribe_whisper::WhisperSegment;

    #[test]
    fn flat_transcript_from_segments() {
        let response = WhisperResult {
            text: "Hello\n world".into(),
            segments: vec![
                WhisperSegment {
                    start: 0.0,
                    end: 2.0,
                    text: "Hello".into(),
                },
                WhisperSegment {
                    start: 2.0,
                    end: 5.0,
                    text: " world".into(),
                },
            ],
            language: Some("en".into()),
        };
        let transcript = process_response(&response).unwrap();
        assert_eq!(transcript.txt(), "Hello\nworld");
        assert!(transcript.segments().iter().all(|(src, _)| src.is_none()));
    }

    #[test]
    fn whitespace_only_segments_are_dropped() {
        let response = WhisperResult {
            text: "   \ncopy that".into(),
            segments: vec![
                WhisperSegment {
                    start: 0.0,
                    end: 1.0,
                    text: "   ".into(),
                },
                WhisperSegment {
                    start: 1.0,
                    end: 2.0,
                    text: "copy that".into(),
                },
            ],
            language: Some("en".into()),
        };
        let transcript = process_response(&response).unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.txt(), "copy that");
    }

    #[test]
    fn caller_prompt_is_forwarded() {
        let options = build_transcribe_options("Main Street", &ShaperConfig::default());
        assert_eq!(options.initial_prompt, "Main Street");
        assert!(options.cleanup);
    }
}
