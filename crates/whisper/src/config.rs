//! Decode defaults and transcript cleanup rules.
//!
//! Both have built-in defaults and can be overridden by JSON files under
//! `config/`, matching the deployment layout the workers ship with.

use std::path::Path;

use serde::{Deserialize, Serialize};

const WHISPER_CONFIG_PATH: &str = "config/whisper.json";
const CLEANUP_CONFIG_PATH: &str = "config/transcript_cleanup.json";

/// Engine-specific decoding hints forwarded to backends that understand them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeOptions {
    #[serde(default)]
    pub beam_size: Option<u32>,
    #[serde(default)]
    pub best_of: Option<u32>,
    #[serde(default)]
    pub compression_ratio_threshold: Option<f64>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        // Beam size 5 standardizes quality across backends;
        // the compression ratio threshold guards against repetitive segments.
        Self {
            beam_size: Some(5),
            best_of: None,
            compression_ratio_threshold: Some(1.8),
        }
    }
}

/// Read decode options, preferring `config/whisper.json` when present.
pub fn load_decode_options() -> DecodeOptions {
    load_decode_options_from(Path::new(WHISPER_CONFIG_PATH))
}

fn load_decode_options_from(path: &Path) -> DecodeOptions {
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
            tracing::warn!(path = %path.display(), %err, "ignoring malformed whisper config");
            DecodeOptions::default()
        }),
        Err(_) => DecodeOptions::default(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Case-insensitive substring of the trimmed segment text.
    Partial,
    /// Case-insensitive equality with the trimmed segment text.
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupAction {
    Delete,
    Replace,
}

/// One pattern-based repair rule applied to engine segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupRule {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
    pub match_type: MatchType,
    pub action: CleanupAction,
    pub is_hallucination: bool,
}

/// Read the cleanup rules from `config/transcript_cleanup.json`; absent file
/// means no rules.
pub fn load_cleanup_config() -> Vec<CleanupRule> {
    load_cleanup_config_from(Path::new(CLEANUP_CONFIG_PATH))
}

fn load_cleanup_config_from(path: &Path) -> Vec<CleanupRule> {
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
            tracing::warn!(path = %path.display(), %err, "ignoring malformed cleanup config");
            Vec::new()
        }),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn decode_defaults() {
        let options = DecodeOptions::default();
        assert_eq!(options.beam_size, Some(5));
        assert_eq!(options.compression_ratio_threshold, Some(1.8));
        assert_eq!(options.best_of, None);
    }

    #[test]
    fn decode_options_from_file_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"beam_size": 1, "best_of": 3}}"#).unwrap();
        let options = load_decode_options_from(file.path());
        assert_eq!(options.beam_size, Some(1));
        assert_eq!(options.best_of, Some(3));
        assert_eq!(options.compression_ratio_threshold, None);
    }

    #[test]
    fn cleanup_rules_parse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"pattern": "thanks for watching", "replacement": "", "match_type": "full", "action": "delete", "is_hallucination": true}}]"#
        )
        .unwrap();
        let rules = load_cleanup_config_from(file.path());
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].match_type, MatchType::Full);
        assert_eq!(rules[0].action, CleanupAction::Delete);
        assert!(rules[0].is_hallucination);
    }

    #[test]
    fn missing_files_fall_back() {
        let missing = Path::new("/nonexistent/whisper.json");
        assert_eq!(load_decode_options_from(missing), DecodeOptions::default());
        assert!(load_cleanup_config_from(missing).is_empty());
    }
}
