//! Transcript of a radio call: an ordered list of (source, text) segments.
//!
//! A segment's source is `None` for analog calls (no per-radio attribution)
//! and the originating [`SrcListItem`] for digital calls. The raw JSON form
//! (`[[src|null, text], ...]`) is what gets persisted and round-trips.

use serde::{Deserialize, Serialize};
use trunkscribe_metadata::SrcListItem;

#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("transcript empty/null")]
    Empty,
    #[error("transcript too short")]
    TooShort,
    #[error("malformed raw transcript: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TranscriptError>;

/// The storage form: `[src|null, text]` pairs in speaking order.
pub type RawTranscript = Vec<(Option<SrcListItem>, String)>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    segments: RawTranscript,
}

impl Transcript {
    /// Minimum length of the joined text for a transcript to be valid.
    pub const MIN_LENGTH: usize = 4;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_raw(segments: RawTranscript) -> Self {
        Self { segments }
    }

    pub fn from_raw_json(raw: &str) -> Result<Self> {
        Ok(Self {
            segments: serde_json::from_str(raw)?,
        })
    }

    /// Append a segment, dropping empty text (engines occasionally emit
    /// zero-length segments around silence).
    pub fn append(&mut self, text: impl Into<String>, src: Option<SrcListItem>) -> &mut Self {
        let text = text.into();
        if !text.is_empty() {
            self.segments.push((src, text));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &RawTranscript {
        &self.segments
    }

    /// A transcript is valid when it has segments and the joined text is at
    /// least [`Self::MIN_LENGTH`] characters.
    pub fn validate(&self) -> Result<&Self> {
        if self.is_empty() {
            return Err(TranscriptError::Empty);
        }
        let joined: Vec<&str> = self.segments.iter().map(|(_, text)| text.as_str()).collect();
        if joined.join(" ").chars().count() < Self::MIN_LENGTH {
            return Err(TranscriptError::TooShort);
        }
        Ok(self)
    }

    pub fn raw_json(&self) -> String {
        serde_json::to_string(&self.segments).unwrap_or_else(|_| "[]".into())
    }

    /// HTML form with per-source tagging, `<br>`-joined.
    pub fn html(&self) -> String {
        self.segments
            .iter()
            .map(|(src, text)| match src {
                Some(src) => format!(r#"<i data-src="{}">{}:</i> {}"#, src.src, src.label(), text),
                None => text.clone(),
            })
            .collect::<Vec<_>>()
            .join("<br>")
    }

    /// Plain text form, one `tag: text` line per segment.
    pub fn txt(&self) -> String {
        self.segments
            .iter()
            .map(|(src, text)| match src {
                Some(src) => format!("{}: {}", src.label(), text),
                None => text.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Markdown form used by chat notification channels.
    pub fn markdown(&self) -> String {
        self.segments
            .iter()
            .map(|(src, text)| match src {
                Some(src) => format!("_{}:_ {}", src.label(), text),
                None => text.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Plain text without source labels.
    pub fn txt_nosrc(&self) -> String {
        self.segments
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Re-attribute segments after a source's tag changed (used by reindex
    /// tooling when unit tags are updated).
    pub fn update_src(&mut self, new_src: &SrcListItem) {
        for (src, _) in self.segments.iter_mut() {
            if let Some(existing) = src {
                if existing.src == new_src.src {
                    *existing = new_src.clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(id: i64, tag: &str) -> SrcListItem {
        SrcListItem {
            src: id,
            time: 0,
            pos: 0.0,
            emergency: 0,
            signal_system: String::new(),
            tag: tag.into(),
            transcript_prompt: String::new(),
        }
    }

    #[test]
    fn raw_json_round_trips() {
        let mut transcript = Transcript::new();
        transcript.append("E96 on scene", Some(src(7001, "E96")));
        transcript.append("copy", Some(src(7002, "")));
        let restored = Transcript::from_raw_json(&transcript.raw_json()).unwrap();
        assert_eq!(restored, transcript);
    }

    #[test]
    fn html_uses_tag_or_src_id() {
        let mut transcript = Transcript::new();
        transcript.append("on scene", Some(src(7001, "E96")));
        transcript.append("copy", Some(src(7002, "")));
        assert_eq!(
            transcript.html(),
            r#"<i data-src="7001">E96:</i> on scene<br><i data-src="7002">7002:</i> copy"#
        );
    }

    #[test]
    fn flat_transcript_has_no_labels() {
        let mut transcript = Transcript::new();
        transcript.append("Hello", None);
        transcript.append("world", None);
        assert_eq!(transcript.txt(), "Hello\nworld");
        assert_eq!(transcript.txt(), transcript.txt_nosrc());
    }

    #[test]
    fn append_drops_empty_segments() {
        let mut transcript = Transcript::new();
        transcript.append("", None);
        assert!(transcript.is_empty());
    }

    #[test]
    fn validate_rejects_empty_and_short() {
        assert!(matches!(
            Transcript::new().validate(),
            Err(TranscriptError::Empty)
        ));

        let mut short = Transcript::new();
        short.append("ok", None);
        assert!(matches!(short.validate(), Err(TranscriptError::TooShort)));

        let mut long_enough = Transcript::new();
        long_enough.append("okay", None);
        assert!(long_enough.validate().is_ok());
    }

    #[test]
    fn two_short_segments_pass_via_join_separator() {
        // "ok" + " " + "a" is 4 chars joined, matching the persisted rule.
        let mut transcript = Transcript::new();
        transcript.append("ok", None);
        transcript.append("a", None);
        assert!(transcript.validate().is_ok());
    }

    #[test]
    fn update_src_rewrites_matching_sources_only() {
        let mut transcript = Transcript::new();
        transcript.append("on scene", Some(src(7001, "")));
        transcript.append("copy", Some(src(7002, "B12")));
        transcript.update_src(&src(7001, "E96"));
        assert_eq!(transcript.segments()[0].0.as_ref().unwrap().tag, "E96");
        assert_eq!(transcript.segments()[1].0.as_ref().unwrap().tag, "B12");
    }
}
