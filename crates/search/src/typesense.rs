//! Typesense adapter.
//!
//! Typesense wants a flat schema: the hierarchy levels become dotted field
//! names and `_geo` becomes a `[lat, lng]` geopoint.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value};
use trunkscribe_metadata::{GeoResponse, Metadata};
use trunkscribe_transcript::Transcript;

use crate::document::{build_document, Document};
use crate::url_builder::build_search_url;
use crate::{default_index_name, Result, SearchEngine, SearchError};

const API_KEY_HEADER: &str = "X-TYPESENSE-API-KEY";

pub struct TypesenseAdapter {
    client: reqwest::Client,
    url: String,
    api_key: String,
    search_ui_url: Option<String>,
}

impl TypesenseAdapter {
    pub fn new(url: &str, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            search_ui_url: env::var("SEARCH_UI_URL").ok(),
        })
    }

    pub fn from_env() -> Result<Self> {
        let url = env::var("TYPESENSE_URL").unwrap_or_else(|_| "http://typesense:8108".to_string());
        let api_key = env::var("TYPESENSE_API_KEY")
            .map_err(|_| SearchError::Config("TYPESENSE_API_KEY env must be set".into()))?;
        Self::new(&url, api_key)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.url))
            .header(API_KEY_HEADER, &self.api_key)
    }

    /// Reshape the shared document into Typesense's flat wire form.
    fn to_wire(document: &Document) -> Value {
        let mut wire = serde_json::to_value(document).unwrap_or_else(|_| json!({}));
        if let Some(map) = wire.as_object_mut() {
            if let Some(hierarchy) = map.remove("talkgroup_hierarchy") {
                map.insert("talkgroup_hierarchy.lvl0".into(), hierarchy["lvl0"].clone());
                map.insert("talkgroup_hierarchy.lvl1".into(), hierarchy["lvl1"].clone());
                map.insert("talkgroup_hierarchy.lvl2".into(), hierarchy["lvl2"].clone());
            }
            if let Some(geo) = map.remove("_geo") {
                map.insert("_geo".into(), json!([geo["lat"], geo["lng"]]));
            }
        }
        wire
    }

    fn schema(index_name: &str) -> Value {
        json!({
            "name": index_name,
            "fields": [
                {"name": "freq", "type": "int64"},
                {"name": "start_time", "type": "int64", "facet": true},
                {"name": "stop_time", "type": "int64"},
                {"name": "call_length", "type": "float"},
                {"name": "talkgroup", "type": "int64", "facet": true},
                {"name": "talkgroup_tag", "type": "string", "facet": true},
                {"name": "talkgroup_description", "type": "string", "facet": true},
                {"name": "talkgroup_group_tag", "type": "string", "facet": true},
                {"name": "talkgroup_group", "type": "string", "facet": true},
                {"name": "talkgroup_hierarchy.lvl0", "type": "string", "facet": true},
                {"name": "talkgroup_hierarchy.lvl1", "type": "string", "facet": true},
                {"name": "talkgroup_hierarchy.lvl2", "type": "string", "facet": true},
                {"name": "audio_type", "type": "string", "facet": true},
                {"name": "short_name", "type": "string", "facet": true},
                {"name": "srcList", "type": "string[]", "facet": true},
                {"name": "units", "type": "string[]", "facet": true},
                {"name": "radios", "type": "string[]", "facet": true},
                {"name": "transcript", "type": "string"},
                {"name": "transcript_plaintext", "type": "string"},
                {"name": "raw_transcript", "type": "string"},
                {"name": "raw_metadata", "type": "string"},
                {"name": "raw_audio_url", "type": "string"},
                {"name": "geo_formatted_address", "type": "string", "optional": true},
                {"name": "_geo", "type": "geopoint", "optional": true},
            ],
            "default_sorting_field": "start_time",
        })
    }
}

#[async_trait]
impl SearchEngine for TypesenseAdapter {
    async fn index_call(
        &self,
        id: Option<String>,
        metadata: &Metadata,
        raw_audio_url: &str,
        transcript: &Transcript,
        geo: Option<&GeoResponse>,
        index_name: Option<&str>,
    ) -> Result<String> {
        let document = build_document(id, metadata, raw_audio_url, transcript, geo);

        let index_name = match index_name {
            Some(name) => name.to_string(),
            None => {
                let call_time = DateTime::<Utc>::from_timestamp(metadata.start_time, 0)
                    .ok_or_else(|| {
                        SearchError::InvalidMetadata(format!(
                            "bad start_time {}",
                            metadata.start_time
                        ))
                    })?;
                default_index_name(Some(call_time))
            }
        };

        tracing::debug!(index = %index_name, id = %document.id, "indexing call");

        self.request(
            reqwest::Method::POST,
            &format!("/collections/{index_name}/documents?action=upsert"),
        )
        .json(&Self::to_wire(&document))
        .send()
        .await?
        .error_for_status()?;

        Ok(match &self.search_ui_url {
            Some(base) => build_search_url(
                base,
                &document,
                &index_name,
                &format!("{index_name}/sort/start_time:desc"),
            ),
            None => String::new(),
        })
    }

    async fn create_or_update_index(&self, index_name: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::GET, &format!("/collections/{index_name}"))
            .send()
            .await?;
        if response.status() != StatusCode::NOT_FOUND {
            response.error_for_status()?;
            return Ok(());
        }

        tracing::info!(index = index_name, "creating collection");
        self.request(reqwest::Method::POST, "/collections")
            .json(&Self::schema(index_name))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_index(&self, index_name: &str) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/collections/{index_name}"),
            )
            .send()
            .await?;
        if response.status() != StatusCode::NOT_FOUND {
            response.error_for_status()?;
        }
        Ok(())
    }

    async fn search(&self, index_name: &str, query: &str) -> Result<Value> {
        let results = self
            .request(
                reqwest::Method::GET,
                &format!("/collections/{index_name}/documents/search"),
            )
            .query(&[("q", query), ("query_by", "transcript_plaintext")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trunkscribe_metadata::Geo;

    #[test]
    fn wire_form_flattens_hierarchy_and_geo() {
        let mut transcript = Transcript::new();
        transcript.append("ten four", None);
        let metadata = Metadata {
            freq: 0,
            start_time: 1,
            stop_time: 2,
            call_length: 1.0,
            talkgroup: 7,
            talkgroup_tag: "tag".into(),
            talkgroup_description: String::new(),
            talkgroup_group_tag: String::new(),
            talkgroup_group: "grp".into(),
            audio_type: trunkscribe_metadata::AudioType::Analog,
            short_name: "sys".into(),
            emergency: 0,
            encrypted: 0,
            freq_list: Vec::new(),
            src_list: Vec::new(),
        };
        let geo = GeoResponse {
            geo: Geo {
                lat: 41.88,
                lng: -87.63,
            },
            geo_formatted_address: "100 N Main St".into(),
        };
        let document = build_document(Some("9".into()), &metadata, "", &transcript, Some(&geo));
        let wire = TypesenseAdapter::to_wire(&document);

        assert_eq!(wire["talkgroup_hierarchy.lvl1"], "sys > grp");
        assert!(wire.get("talkgroup_hierarchy").is_none());
        assert_eq!(wire["_geo"], json!([41.88, -87.63]));
        assert_eq!(wire["id"], "9");
    }

    #[test]
    fn schema_fields_match_the_document() {
        let schema = TypesenseAdapter::schema("calls");
        let names: Vec<&str> = schema["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|field| field["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"talkgroup_hierarchy.lvl0"));
        assert!(names.contains(&"_geo"));
        assert_eq!(schema["default_sorting_field"], "start_time");
    }
}
