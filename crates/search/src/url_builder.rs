//! Deep links into the search UI.
//!
//! The UI keeps its state in flattened bracket-style query params
//! (`calls[sortBy]=...`, `calls[refinementList][talkgroup_tag][0]=...`), so
//! the nested parameter tree is flattened before encoding.

use serde_json::Value;
use url::form_urlencoded;

use crate::document::Document;

/// Around the call: 20 minutes back, 10 minutes forward.
const RANGE_BEFORE_SECS: i64 = 60 * 20;
const RANGE_AFTER_SECS: i64 = 60 * 10;
const HITS_PER_PAGE: u32 = 60;

fn flatten_into(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                let child = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}[{key}]")
                };
                flatten_into(&child, value, out);
            }
        }
        Value::Array(items) => {
            for (i, value) in items.iter().enumerate() {
                flatten_into(&format!("{prefix}[{i}]"), value, out);
            }
        }
        Value::String(text) => out.push((prefix.to_string(), text.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

/// Build `{base}?{params}#hit-{id}`: newest first, the call's talkgroup
/// refined, and a time window anchored on the call.
pub fn build_search_url(base_url: &str, document: &Document, index_name: &str, sort_by: &str) -> String {
    let params = serde_json::json!({
        index_name: {
            "sortBy": sort_by,
            "hitsPerPage": HITS_PER_PAGE,
            "refinementList": {"talkgroup_tag": [document.talkgroup_tag]},
            "range": {
                "start_time": format!(
                    "{}:{}",
                    document.start_time - RANGE_BEFORE_SECS,
                    document.start_time + RANGE_AFTER_SECS
                )
            },
        }
    });

    let mut pairs = Vec::new();
    flatten_into("", &params, &mut pairs);

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in &pairs {
        serializer.append_pair(key, value);
    }
    let encoded = serializer.finish();

    format!("{base_url}?{encoded}#hit-{}", document.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TalkgroupHierarchy;

    fn document() -> Document {
        Document {
            freq: 851_137_500,
            start_time: 1_704_067_200,
            stop_time: 1_704_067_205,
            call_length: 5.0,
            talkgroup: 1234,
            talkgroup_tag: "Fire Dispatch".into(),
            talkgroup_description: String::new(),
            talkgroup_group_tag: String::new(),
            talkgroup_group: "Fire".into(),
            talkgroup_hierarchy: TalkgroupHierarchy {
                lvl0: "cfd".into(),
                lvl1: "cfd > Fire".into(),
                lvl2: "cfd > Fire > Fire Dispatch".into(),
            },
            audio_type: "digital".into(),
            short_name: "cfd".into(),
            src_list: Vec::new(),
            units: Vec::new(),
            radios: Vec::new(),
            transcript: String::new(),
            transcript_plaintext: String::new(),
            raw_transcript: "[]".into(),
            raw_metadata: "{}".into(),
            raw_audio_url: String::new(),
            id: "991".into(),
            geo: None,
            geo_formatted_address: None,
        }
    }

    #[test]
    fn url_contains_anchor_refinement_and_range() {
        let url = build_search_url(
            "https://search.example.com",
            &document(),
            "calls_2024_01",
            "calls_2024_01:start_time:desc",
        );
        assert!(url.starts_with("https://search.example.com?"));
        assert!(url.ends_with("#hit-991"));
        assert!(url.contains("calls_2024_01%5BsortBy%5D=calls_2024_01%3Astart_time%3Adesc"));
        assert!(url.contains("Fire+Dispatch"));
        assert!(url.contains("1704066000%3A1704067800"));
        assert!(url.contains("%5BhitsPerPage%5D=60"));
    }

    #[test]
    fn nested_arrays_flatten_with_indices() {
        let value = serde_json::json!({"a": {"b": ["x", "y"]}});
        let mut pairs = Vec::new();
        flatten_into("", &value, &mut pairs);
        assert_eq!(
            pairs,
            vec![
                ("a[b][0]".to_string(), "x".to_string()),
                ("a[b][1]".to_string(), "y".to_string()),
            ]
        );
    }

    #[test]
    fn same_document_builds_same_url() {
        let first = build_search_url("https://s", &document(), "calls", "calls:start_time:desc");
        let second = build_search_url("https://s", &document(), "calls", "calls:start_time:desc");
        assert_eq!(first, second);
    }
}
