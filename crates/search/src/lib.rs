//! Full-text search indexing of transcribed calls.
//!
//! A call becomes one flat [`Document`] written to either Meilisearch or
//! Typesense behind the [`SearchEngine`] trait. Indexes are optionally
//! sharded by month, named `<base>_YYYY_MM` from the call's start time.

mod document;
mod meilisearch;
mod typesense;
mod url_builder;

use std::env;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use trunkscribe_metadata::{GeoResponse, Metadata};
use trunkscribe_transcript::Transcript;

pub use document::{build_document, derive_document_id, Document, TalkgroupHierarchy};
pub use meilisearch::MeilisearchAdapter;
pub use typesense::TypesenseAdapter;
pub use url_builder::build_search_url;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("missing configuration: {0}")]
    Config(String),
    #[error("search engine request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search engine rejected request: {0}")]
    Api(String),
    #[error("index settings update failed: {0}")]
    Settings(String),
    #[error("invalid call metadata: {0}")]
    InvalidMetadata(String),
}

pub type Result<T> = std::result::Result<T, SearchError>;

/// Index name for calls at `time`, honoring monthly sharding.
pub fn index_name_for(base: &str, split_by_month: bool, time: DateTime<Utc>) -> String {
    if split_by_month {
        format!("{base}{}", time.format("_%Y_%m"))
    } else {
        base.to_string()
    }
}

/// The configured index name for `time` (now when `None`).
pub fn default_index_name(time: Option<DateTime<Utc>>) -> String {
    let base = env::var("MEILI_INDEX").unwrap_or_else(|_| "calls".to_string());
    let split = env::var("MEILI_INDEX_SPLIT_BY_MONTH")
        .map(|value| value == "true")
        .unwrap_or(false);
    index_name_for(&base, split, time.unwrap_or_else(Utc::now))
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Upsert one call into the index and return the deep link into the
    /// search UI. `id` defaults to the sha-256 of the raw metadata.
    async fn index_call(
        &self,
        id: Option<String>,
        metadata: &Metadata,
        raw_audio_url: &str,
        transcript: &Transcript,
        geo: Option<&GeoResponse>,
        index_name: Option<&str>,
    ) -> Result<String>;

    /// Create the index, or bring an existing one's settings up to date.
    async fn create_or_update_index(&self, index_name: &str) -> Result<()>;

    async fn delete_index(&self, index_name: &str) -> Result<()>;

    async fn search(&self, index_name: &str, query: &str) -> Result<serde_json::Value>;

    /// Pre-create next month's index shortly before the boundary so
    /// cross-boundary writes never race to create the schema.
    async fn make_next_index(&self) -> Result<()> {
        let future_name = default_index_name(Some(Utc::now() + Duration::hours(1)));
        if default_index_name(None) != future_name {
            self.create_or_update_index(&future_name).await?;
        }
        Ok(())
    }
}

/// Pick the adapter the environment is configured for.
pub fn default_engine() -> Result<Box<dyn SearchEngine>> {
    if env::var("MEILI_URL").is_ok() && env::var("MEILI_MASTER_KEY").is_ok() {
        Ok(Box::new(MeilisearchAdapter::from_env()?))
    } else if env::var("TYPESENSE_URL").is_ok() && env::var("TYPESENSE_API_KEY").is_ok() {
        Ok(Box::new(TypesenseAdapter::from_env()?))
    } else {
        Err(SearchError::Config(
            "no search engine configured (MEILI_URL/MEILI_MASTER_KEY or TYPESENSE_URL/TYPESENSE_API_KEY)".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn index_name_with_and_without_sharding() {
        let time = Utc.with_ymd_and_hms(2026, 2, 28, 23, 59, 30).unwrap();
        assert_eq!(index_name_for("calls", false, time), "calls");
        assert_eq!(index_name_for("calls", true, time), "calls_2026_02");
    }

    #[test]
    fn month_boundary_rolls_the_shard() {
        let end_of_feb = Utc.with_ymd_and_hms(2026, 2, 28, 23, 59, 30).unwrap();
        let one_hour_on = end_of_feb + Duration::hours(1);
        assert_eq!(index_name_for("calls", true, end_of_feb), "calls_2026_02");
        assert_eq!(index_name_for("calls", true, one_hour_on), "calls_2026_03");
    }
}
