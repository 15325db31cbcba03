use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use trunkscribe_metadata::Metadata;

use crate::Result;

/// Where the worker finds the call audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallAudio {
    /// Object-storage (or intake-served) URL, fetched with a streamed GET.
    Url(String),
    /// Base64 bytes inlined by the intake for fresh uploads.
    Inline(String),
}

impl CallAudio {
    pub fn inline_from_bytes(bytes: &[u8]) -> Self {
        CallAudio::Inline(BASE64.encode(bytes))
    }

    pub fn decode_inline(encoded: &str) -> Result<Vec<u8>> {
        Ok(BASE64.decode(encoded)?)
    }
}

/// The unit of work: everything a worker needs to transcribe one call.
///
/// `call_id` is present for reprocessing jobs; its presence suppresses
/// notifications and routes the transcript back onto the existing call row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallJob {
    pub metadata: Metadata,
    pub audio: CallAudio,
    #[serde(default)]
    pub whisper_implementation: Option<String>,
    #[serde(default)]
    pub call_id: Option<i64>,
    #[serde(default)]
    pub index_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use trunkscribe_metadata::AudioType;

    fn metadata() -> Metadata {
        Metadata {
            freq: 851_137_500,
            start_time: 1_704_067_200,
            stop_time: 1_704_067_208,
            call_length: 8.0,
            talkgroup: 42,
            talkgroup_tag: "PD North".into(),
            talkgroup_description: "North District Patrol".into(),
            talkgroup_group_tag: "Police".into(),
            talkgroup_group: "Police".into(),
            audio_type: AudioType::Analog,
            short_name: "cpd".into(),
            emergency: 0,
            encrypted: 0,
            freq_list: Vec::new(),
            src_list: Vec::new(),
        }
    }

    #[test]
    fn job_round_trips_through_json() {
        let job = CallJob {
            metadata: metadata(),
            audio: CallAudio::Url("https://media.example.com/a.mp3".into()),
            whisper_implementation: Some("deepgram:nova-2".into()),
            call_id: Some(991),
            index_name: Some("calls_2026_02".into()),
        };
        let raw = serde_json::to_string(&job).unwrap();
        let restored: CallJob = serde_json::from_str(&raw).unwrap();
        assert_eq!(restored, job);
    }

    #[test]
    fn optional_fields_default_to_none() {
        let job = CallJob {
            metadata: metadata(),
            audio: CallAudio::Url("https://media.example.com/a.mp3".into()),
            whisper_implementation: None,
            call_id: None,
            index_name: None,
        };
        let raw = serde_json::to_string(&job).unwrap();
        let trimmed = raw
            .replace(r#","whisper_implementation":null"#, "")
            .replace(r#","call_id":null"#, "")
            .replace(r#","index_name":null"#, "");
        let restored: CallJob = serde_json::from_str(&trimmed).unwrap();
        assert_eq!(restored, job);
    }

    #[test]
    fn inline_audio_round_trips() {
        let bytes = b"RIFF....WAVEfmt ";
        let audio = CallAudio::inline_from_bytes(bytes);
        match &audio {
            CallAudio::Inline(encoded) => {
                assert_eq!(CallAudio::decode_inline(encoded).unwrap(), bytes);
            }
            _ => panic!("expected inline audio"),
        }
    }
}
