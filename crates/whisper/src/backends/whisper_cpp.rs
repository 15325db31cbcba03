//! Subprocess backend driving the `whisper-cpp` binary.
//!
//! The binary writes a `<input>.csv` transcript next to the audio file; the
//! CSV is parsed and deleted on every exit path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::engine::WhisperEngine;
use crate::types::{TranscribeOptions, WhisperResult, WhisperSegment};
use crate::{Result, WhisperError};

/// whisper.cpp emits these for non-speech audio.
const PLACEHOLDER_MARKERS: [&str; 2] = ["[BLANK_AUDIO]", "[SOUND]"];

pub struct WhisperCpp {
    model_path: PathBuf,
}

impl WhisperCpp {
    pub fn new(model: &str, model_dir: &Path) -> Self {
        Self {
            model_path: model_dir.join(format!("ggml-{model}.bin")),
        }
    }
}

fn parse_transcript_csv(path: &Path, language: &str) -> Result<WhisperResult> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|err| WhisperError::MalformedOutput(format!("{}: {err}", path.display())))?;

    let mut result = WhisperResult::empty(language);
    for record in reader.records() {
        let record =
            record.map_err(|err| WhisperError::MalformedOutput(format!("bad csv row: {err}")))?;
        let (start, end, text) = match (record.get(0), record.get(1), record.get(2)) {
            (Some(start), Some(end), Some(text)) => (start, end, text),
            _ => {
                return Err(WhisperError::MalformedOutput(format!(
                    "csv row with {} fields",
                    record.len()
                )))
            }
        };

        if text.is_empty()
            || PLACEHOLDER_MARKERS
                .iter()
                .any(|marker| text.contains(marker))
        {
            continue;
        }

        let start: f64 = start
            .parse()
            .map_err(|_| WhisperError::MalformedOutput(format!("bad start time: {start}")))?;
        let end: f64 = end
            .parse()
            .map_err(|_| WhisperError::MalformedOutput(format!("bad end time: {end}")))?;

        result.segments.push(WhisperSegment {
            start: start / 1000.0,
            end: end / 1000.0,
            text: text.to_string(),
        });
    }
    result.rejoin_text();

    Ok(result)
}

#[async_trait]
impl WhisperEngine for WhisperCpp {
    async fn transcribe(
        &self,
        audio: &Path,
        options: &TranscribeOptions,
        language: &str,
    ) -> Result<WhisperResult> {
        let mut args: Vec<String> = vec![
            "--model".into(),
            self.model_path.display().to_string(),
            "--language".into(),
            language.into(),
            "--output-csv".into(),
        ];
        if !options.initial_prompt.is_empty() {
            args.push("--prompt".into());
            args.push(options.initial_prompt.clone());
        }
        if let Some(best_of) = options.decode.best_of {
            args.push("--best-of".into());
            args.push(best_of.to_string());
        }
        if let Some(beam_size) = options.decode.beam_size {
            args.push("--beam-size".into());
            args.push(beam_size.to_string());
        }
        args.push(audio.display().to_string());

        let output = Command::new("whisper-cpp").args(&args).output().await?;
        if !output.status.success() {
            return Err(WhisperError::Process(format!(
                "whisper-cpp exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let csv_path = PathBuf::from(format!("{}.csv", audio.display()));
        let parsed = parse_transcript_csv(&csv_path, language);
        if let Err(err) = std::fs::remove_file(&csv_path) {
            tracing::warn!(path = %csv_path.display(), %err, "failed to remove transcript csv");
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn parses_rows_and_scales_to_seconds() {
        let file = write_csv("start,end,text\n0,1200,\"E96 on scene\"\n2600,4100,\"copy\"\n");
        let result = parse_transcript_csv(file.path(), "en").unwrap();
        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.segments[0].start, 0.0);
        assert_eq!(result.segments[0].end, 1.2);
        assert_eq!(result.segments[1].text, "copy");
        assert_eq!(result.text, "E96 on scene\ncopy");
    }

    #[test]
    fn filters_placeholder_rows() {
        let file = write_csv(
            "start,end,text\n0,500,\"[BLANK_AUDIO]\"\n500,900,\"\"\n900,1500,\"[SOUND]\"\n1500,2000,\"ten four\"\n",
        );
        let result = parse_transcript_csv(file.path(), "en").unwrap();
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.text, "ten four");
    }

    #[test]
    fn rejects_malformed_times() {
        let file = write_csv("start,end,text\nabc,1,\"hi\"\n");
        assert!(matches!(
            parse_transcript_csv(file.path(), "en"),
            Err(WhisperError::MalformedOutput(_))
        ));
    }
}
