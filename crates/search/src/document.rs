//! The flat, denormalized search document.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use trunkscribe_metadata::{Geo, GeoResponse, Metadata};
use trunkscribe_transcript::Transcript;

/// Three-level talkgroup path used for hierarchical faceting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalkgroupHierarchy {
    pub lvl0: String,
    pub lvl1: String,
    pub lvl2: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub freq: i64,
    pub start_time: i64,
    pub stop_time: i64,
    pub call_length: f64,
    pub talkgroup: i64,
    pub talkgroup_tag: String,
    pub talkgroup_description: String,
    pub talkgroup_group_tag: String,
    pub talkgroup_group: String,
    pub talkgroup_hierarchy: TalkgroupHierarchy,
    pub audio_type: String,
    pub short_name: String,
    #[serde(rename = "srcList")]
    pub src_list: Vec<String>,
    pub units: Vec<String>,
    pub radios: Vec<String>,
    pub transcript: String,
    pub transcript_plaintext: String,
    pub raw_transcript: String,
    pub raw_metadata: String,
    pub raw_audio_url: String,
    pub id: String,
    #[serde(rename = "_geo", skip_serializing_if = "Option::is_none")]
    pub geo: Option<Geo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_formatted_address: Option<String>,
}

/// Stable document id when the call store assigned none: the sha-256 of the
/// serialized metadata. Pure, so reprocessing the same call upserts the same
/// document.
pub fn derive_document_id(raw_metadata: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_metadata.as_bytes());
    hex::encode(hasher.finalize())
}

/// Flatten (metadata, transcript, geo) into the searchable document.
pub fn build_document(
    id: Option<String>,
    metadata: &Metadata,
    raw_audio_url: &str,
    transcript: &Transcript,
    geo: Option<&GeoResponse>,
) -> Document {
    // Insertion-ordered distinct sets so repeated indexing is byte-stable.
    let mut src_list: Vec<String> = Vec::new();
    let mut units: Vec<String> = Vec::new();
    let mut radios: Vec<String> = Vec::new();
    for src in &metadata.src_list {
        if src.src <= 0 {
            continue;
        }
        if !src.tag.is_empty() {
            if !units.contains(&src.tag) {
                units.push(src.tag.clone());
            }
            if !src_list.contains(&src.tag) {
                src_list.push(src.tag.clone());
            }
        } else if !src_list.contains(&src.src.to_string()) {
            src_list.push(src.src.to_string());
        }
        if !radios.contains(&src.src.to_string()) {
            radios.push(src.src.to_string());
        }
    }

    let raw_metadata = serde_json::to_string(metadata).unwrap_or_else(|_| "{}".into());
    let id = id.unwrap_or_else(|| derive_document_id(&raw_metadata));

    Document {
        freq: metadata.freq,
        start_time: metadata.start_time,
        stop_time: metadata.stop_time,
        call_length: metadata.call_length,
        talkgroup: metadata.talkgroup,
        talkgroup_tag: metadata.talkgroup_tag.clone(),
        talkgroup_description: metadata.talkgroup_description.clone(),
        talkgroup_group_tag: metadata.talkgroup_group_tag.clone(),
        talkgroup_group: metadata.talkgroup_group.clone(),
        talkgroup_hierarchy: TalkgroupHierarchy {
            lvl0: metadata.short_name.clone(),
            lvl1: format!("{} > {}", metadata.short_name, metadata.talkgroup_group),
            lvl2: format!(
                "{} > {} > {}",
                metadata.short_name, metadata.talkgroup_group, metadata.talkgroup_tag
            ),
        },
        audio_type: metadata.audio_type.as_str().to_string(),
        short_name: metadata.short_name.clone(),
        src_list,
        units,
        radios,
        transcript: transcript.html(),
        transcript_plaintext: transcript.txt(),
        raw_transcript: transcript.raw_json(),
        raw_metadata,
        raw_audio_url: raw_audio_url.to_string(),
        id,
        geo: geo.map(|geo| geo.geo),
        geo_formatted_address: geo.map(|geo| geo.geo_formatted_address.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trunkscribe_metadata::{AudioType, SrcListItem};

    fn src(id: i64, pos: f64, tag: &str) -> SrcListItem {
        SrcListItem {
            src: id,
            time: 0,
            pos,
            emergency: 0,
            signal_system: String::new(),
            tag: tag.into(),
            transcript_prompt: String::new(),
        }
    }

    fn metadata() -> Metadata {
        Metadata {
            freq: 851_137_500,
            start_time: 1_704_067_200,
            stop_time: 1_704_067_205,
            call_length: 5.0,
            talkgroup: 1234,
            talkgroup_tag: "Fire Dispatch".into(),
            talkgroup_description: "Citywide Fire Dispatch".into(),
            talkgroup_group_tag: "Fire".into(),
            talkgroup_group: "Fire".into(),
            audio_type: AudioType::Digital,
            short_name: "cfd".into(),
            emergency: 0,
            encrypted: 0,
            freq_list: Vec::new(),
            src_list: vec![
                src(7001, 0.0, "E96"),
                src(7002, 2.5, ""),
                src(-1, 3.0, "ignored"),
                src(7001, 4.0, "E96"),
            ],
        }
    }

    fn transcript() -> Transcript {
        let mut transcript = Transcript::new();
        transcript.append("E96 on scene", Some(src(7001, 0.0, "E96")));
        transcript.append("copy", Some(src(7002, 2.5, "")));
        transcript
    }

    #[test]
    fn derivations_exclude_nonpositive_sources() {
        let doc = build_document(
            Some("42".into()),
            &metadata(),
            "https://media.example.com/a.mp3",
            &transcript(),
            None,
        );
        assert_eq!(doc.units, vec!["E96"]);
        assert_eq!(doc.radios, vec!["7001", "7002"]);
        assert_eq!(doc.src_list, vec!["E96", "7002"]);
        assert_eq!(doc.id, "42");
        assert!(doc.geo.is_none());
    }

    #[test]
    fn hierarchy_levels() {
        let doc = build_document(None, &metadata(), "", &transcript(), None);
        assert_eq!(doc.talkgroup_hierarchy.lvl0, "cfd");
        assert_eq!(doc.talkgroup_hierarchy.lvl1, "cfd > Fire");
        assert_eq!(doc.talkgroup_hierarchy.lvl2, "cfd > Fire > Fire Dispatch");
    }

    #[test]
    fn derived_id_is_stable() {
        let first = build_document(None, &metadata(), "", &transcript(), None);
        let second = build_document(None, &metadata(), "", &transcript(), None);
        assert_eq!(first.id, second.id);
        assert_eq!(first.id.len(), 64);
    }

    #[test]
    fn reindexing_is_byte_identical() {
        let doc = |geo: Option<&GeoResponse>| {
            build_document(
                Some("42".into()),
                &metadata(),
                "https://media.example.com/a.mp3",
                &transcript(),
                geo,
            )
        };
        let first = serde_json::to_string(&doc(None)).unwrap();
        let second = serde_json::to_string(&doc(None)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn geo_fields_present_iff_geo_given() {
        let geo = GeoResponse {
            geo: Geo {
                lat: 41.88,
                lng: -87.63,
            },
            geo_formatted_address: "100 N Main St".into(),
        };
        let with_geo = build_document(Some("1".into()), &metadata(), "", &transcript(), Some(&geo));
        assert!(with_geo.geo.is_some());

        let raw = serde_json::to_string(&build_document(
            Some("1".into()),
            &metadata(),
            "",
            &transcript(),
            None,
        ))
        .unwrap();
        assert!(!raw.contains("_geo"));
        assert!(!raw.contains("geo_formatted_address"));
    }

    #[test]
    fn analog_call_has_empty_unit_sets() {
        let mut analog = metadata();
        analog.audio_type = AudioType::Analog;
        analog.src_list.clear();
        let mut flat = Transcript::new();
        flat.append("Hello", None);
        flat.append("world", None);
        let doc = build_document(None, &analog, "", &flat, None);
        assert!(doc.units.is_empty());
        assert!(doc.src_list.is_empty());
        assert!(doc.radios.is_empty());
        assert_eq!(doc.transcript_plaintext, "Hello\nworld");
    }
}
