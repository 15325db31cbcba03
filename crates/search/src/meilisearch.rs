//! Meilisearch adapter.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value};
use trunkscribe_metadata::{GeoResponse, Metadata};
use trunkscribe_transcript::Transcript;

use crate::document::build_document;
use crate::url_builder::build_search_url;
use crate::{default_index_name, Result, SearchEngine, SearchError};

const TASK_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct MeilisearchAdapter {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    search_ui_url: Option<String>,
}

impl MeilisearchAdapter {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
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
        let url = env::var("MEILI_URL").unwrap_or_else(|_| "http://meilisearch:7700".to_string());
        Self::new(&url, env::var("MEILI_MASTER_KEY").ok())
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, format!("{}{path}", self.url));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    fn desired_settings() -> Value {
        json!({
            "searchableAttributes": ["transcript_plaintext"],
            "filterableAttributes": [
                "start_time",
                "talkgroup",
                "talkgroup_tag",
                "talkgroup_description",
                "talkgroup_group_tag",
                "talkgroup_group",
                "talkgroup_hierarchy.lvl0",
                "talkgroup_hierarchy.lvl1",
                "talkgroup_hierarchy.lvl2",
                "audio_type",
                "short_name",
                "units",
                "radios",
                "srcList",
                "_geo",
            ],
            "sortableAttributes": ["start_time", "_geo"],
            "rankingRules": ["sort", "words", "typo", "proximity", "attribute", "exactness"],
        })
    }

    /// Block until the given task leaves the queue; a failed settings task
    /// means the schema is wrong, which is fatal.
    async fn wait_for_task(&self, task_uid: i64) -> Result<()> {
        loop {
            let task: Value = self
                .request(reqwest::Method::GET, &format!("/tasks/{task_uid}"))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            match task["status"].as_str() {
                Some("succeeded") => return Ok(()),
                Some("failed") | Some("canceled") => {
                    return Err(SearchError::Settings(format!(
                        "task {task_uid} ended as {}",
                        task["status"]
                    )))
                }
                _ => tokio::time::sleep(TASK_POLL_INTERVAL).await,
            }
        }
    }
}

#[async_trait]
impl SearchEngine for MeilisearchAdapter {
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

        // Adding a document with an existing id is an upsert.
        self.request(
            reqwest::Method::POST,
            &format!("/indexes/{index_name}/documents"),
        )
        .json(&vec![&document])
        .send()
        .await?
        .error_for_status()?;

        Ok(match &self.search_ui_url {
            Some(base) => build_search_url(
                base,
                &document,
                &index_name,
                &format!("{index_name}:start_time:desc"),
            ),
            None => String::new(),
        })
    }

    async fn create_or_update_index(&self, index_name: &str) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/indexes/{index_name}/settings"),
            )
            .send()
            .await?;

        let current: Value = if response.status() == StatusCode::NOT_FOUND {
            json!({})
        } else {
            response.error_for_status()?.json().await?
        };

        // Only send the settings that differ.
        let mut desired = Self::desired_settings();
        if let Some(map) = desired.as_object_mut() {
            map.retain(|key, value| current.get(key) != Some(value));
        }
        if desired.as_object().map(|map| map.is_empty()).unwrap_or(true) {
            return Ok(());
        }

        tracing::info!(index = index_name, settings = %desired, "updating index settings");
        let task: Value = self
            .request(
                reqwest::Method::PATCH,
                &format!("/indexes/{index_name}/settings"),
            )
            .json(&desired)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match task["taskUid"].as_i64() {
            Some(task_uid) => self.wait_for_task(task_uid).await,
            None => Err(SearchError::Settings("no taskUid in response".into())),
        }
    }

    async fn delete_index(&self, index_name: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/indexes/{index_name}"))
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
                reqwest::Method::POST,
                &format!("/indexes/{index_name}/search"),
            )
            .json(&json!({"q": query}))
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

    #[test]
    fn settings_cover_the_schema() {
        let settings = MeilisearchAdapter::desired_settings();
        let filterable: Vec<&str> = settings["filterableAttributes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|value| value.as_str().unwrap())
            .collect();
        assert!(filterable.contains(&"talkgroup_hierarchy.lvl2"));
        assert!(filterable.contains(&"_geo"));
        assert_eq!(
            settings["rankingRules"].as_array().unwrap().len(),
            6,
            "sort must stay the leading ranking rule"
        );
        assert_eq!(settings["rankingRules"][0], "sort");
        assert_eq!(settings["searchableAttributes"][0], "transcript_plaintext");
    }
}
