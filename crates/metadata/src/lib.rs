//! Call metadata as produced by trunk-recorder and friends.
//!
//! Field names follow the recorder's JSON envelope exactly (`freqList`,
//! `srcList`, `transcript_prompt`) so a call file deserializes as-is.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("malformed call metadata: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid call metadata: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, MetadataError>;

/// Modulation / framing of the captured call audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioType {
    #[serde(rename = "analog")]
    Analog,
    #[serde(rename = "digital")]
    Digital,
    #[serde(rename = "digital tdma")]
    DigitalTdma,
}

impl AudioType {
    pub fn is_digital(&self) -> bool {
        matches!(self, AudioType::Digital | AudioType::DigitalTdma)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioType::Analog => "analog",
            AudioType::Digital => "digital",
            AudioType::DigitalTdma => "digital tdma",
        }
    }
}

/// One frequency the call was observed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreqListItem {
    pub freq: i64,
    pub time: i64,
    pub pos: f64,
    pub len: f64,
    #[serde(default)]
    pub error_count: i64,
    #[serde(default)]
    pub spike_count: i64,
}

/// One transmitting radio within the call.
///
/// `pos` is the offset in seconds into the audio where this radio starts
/// speaking; positions are non-decreasing for digital calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrcListItem {
    pub src: i64,
    pub time: i64,
    pub pos: f64,
    #[serde(default)]
    pub emergency: u8,
    #[serde(default)]
    pub signal_system: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub transcript_prompt: String,
}

impl SrcListItem {
    /// Display label: the human tag when present, otherwise the radio id.
    pub fn label(&self) -> String {
        if self.tag.is_empty() {
            self.src.to_string()
        } else {
            self.tag.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub freq: i64,
    pub start_time: i64,
    pub stop_time: i64,
    pub call_length: f64,
    pub talkgroup: i64,
    pub talkgroup_tag: String,
    pub talkgroup_description: String,
    pub talkgroup_group_tag: String,
    pub talkgroup_group: String,
    pub audio_type: AudioType,
    pub short_name: String,
    #[serde(default)]
    pub emergency: u8,
    #[serde(default)]
    pub encrypted: u8,
    #[serde(rename = "freqList", default)]
    pub freq_list: Vec<FreqListItem>,
    #[serde(rename = "srcList", default)]
    pub src_list: Vec<SrcListItem>,
}

impl Metadata {
    pub fn from_json(raw: &str) -> Result<Self> {
        let metadata: Metadata = serde_json::from_str(raw)?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Structural invariants shared by every call, plus the digital-only
    /// requirements on the source list.
    pub fn validate(&self) -> Result<()> {
        if self.start_time > self.stop_time {
            return Err(MetadataError::Invalid(format!(
                "start_time {} is after stop_time {}",
                self.start_time, self.stop_time
            )));
        }
        if self.audio_type.is_digital() {
            if self.src_list.is_empty() {
                return Err(MetadataError::Invalid(
                    "digital call has an empty srcList".into(),
                ));
            }
            let positions: Vec<f64> = self.src_list.iter().map(|s| s.pos).collect();
            if positions.windows(2).any(|w| w[0] > w[1]) {
                return Err(MetadataError::Invalid(
                    "srcList positions are not non-decreasing".into(),
                ));
            }
        }
        Ok(())
    }
}

/// A point on the globe, as the search engines expect it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    pub lat: f64,
    pub lng: f64,
}

/// Geocoding result attached to a call when an address could be extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoResponse {
    pub geo: Geo,
    pub geo_formatted_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "freq": 851137500,
            "start_time": 1704067200,
            "stop_time": 1704067205,
            "call_length": 5.0,
            "talkgroup": 1234,
            "talkgroup_tag": "Fire Dispatch",
            "talkgroup_description": "Citywide Fire Dispatch",
            "talkgroup_group_tag": "Fire",
            "talkgroup_group": "Fire",
            "audio_type": "digital",
            "short_name": "cfd",
            "emergency": 0,
            "encrypted": 0,
            "freqList": [{"freq": 851137500, "time": 1704067200, "pos": 0.0, "len": 5.0}],
            "srcList": [
                {"src": 7001, "time": 1704067200, "pos": 0.0, "emergency": 0, "signal_system": "", "tag": "E96", "transcript_prompt": "Engine 96"},
                {"src": 7002, "time": 1704067202, "pos": 2.5, "emergency": 0, "signal_system": "", "tag": "", "transcript_prompt": ""}
            ]
        }"#
    }

    #[test]
    fn parses_recorder_json() {
        let metadata = Metadata::from_json(sample_json()).unwrap();
        assert_eq!(metadata.audio_type, AudioType::Digital);
        assert_eq!(metadata.src_list.len(), 2);
        assert_eq!(metadata.src_list[0].tag, "E96");
        assert_eq!(metadata.src_list[1].label(), "7002");
    }

    #[test]
    fn audio_type_round_trips_with_space() {
        let tdma: AudioType = serde_json::from_str("\"digital tdma\"").unwrap();
        assert_eq!(tdma, AudioType::DigitalTdma);
        assert_eq!(serde_json::to_string(&tdma).unwrap(), "\"digital tdma\"");
    }

    #[test]
    fn rejects_reversed_times() {
        let mut metadata = Metadata::from_json(sample_json()).unwrap();
        metadata.start_time = metadata.stop_time + 1;
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn rejects_digital_without_sources() {
        let mut metadata = Metadata::from_json(sample_json()).unwrap();
        metadata.src_list.clear();
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn missing_transcript_prompt_defaults_to_empty() {
        let raw = sample_json().replace(", \"transcript_prompt\": \"Engine 96\"", "");
        let metadata = Metadata::from_json(&raw).unwrap();
        assert_eq!(metadata.src_list[0].transcript_prompt, "");
    }
}
