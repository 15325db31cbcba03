//! vast.ai marketplace client.
//!
//! Offers are GPU machines for rent; instances are the ones this fleet is
//! running. Hostnames are `<machine_id>.<host_id>.vast.ai`, stable across
//! restarts of the same machine.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::{Result, ScalerError};

const API_BASE: &str = "https://console.vast.ai/api/v0";

/// A rentable machine returned by the bundle search.
#[derive(Debug, Clone, Deserialize)]
pub struct Offer {
    pub id: i64,
    pub machine_id: i64,
    pub host_id: i64,
    #[serde(default)]
    pub gpu_name: String,
    /// Total GPU memory in MiB.
    #[serde(default)]
    pub gpu_ram: f64,
    /// Hourly price in dollars.
    #[serde(default)]
    pub dph_total: f64,
}

impl Offer {
    pub fn hostname(&self) -> String {
        format!("{}.{}.vast.ai", self.machine_id, self.host_id)
    }
}

/// An instance this account is currently renting.
#[derive(Debug, Clone, Deserialize)]
pub struct Instance {
    pub id: i64,
    pub machine_id: i64,
    pub host_id: i64,
    #[serde(default)]
    pub actual_status: Option<String>,
    #[serde(default)]
    pub cur_state: Option<String>,
    #[serde(default)]
    pub status_msg: Option<String>,
    /// Epoch seconds when the rental started.
    #[serde(default)]
    pub start_date: Option<f64>,
    #[serde(default)]
    pub disk_usage: Option<f64>,
    #[serde(default)]
    pub disk_space: Option<f64>,
    #[serde(default)]
    pub gpu_name: Option<String>,
    #[serde(default)]
    pub dph_total: f64,
    /// `[["KEY", "value"], ...]` pairs passed at creation.
    #[serde(default)]
    pub extra_env: Vec<(String, String)>,
}

impl Instance {
    pub fn hostname(&self) -> String {
        format!("{}.{}.vast.ai", self.machine_id, self.host_id)
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.extra_env
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_running(&self) -> bool {
        self.actual_status.as_deref() == Some("running")
    }
}

#[derive(Debug, Deserialize)]
struct OffersResponse {
    #[serde(default)]
    offers: Vec<Offer>,
}

#[derive(Debug, Deserialize)]
struct InstancesResponse {
    #[serde(default)]
    instances: Vec<Instance>,
}

pub struct VastClient {
    client: reqwest::Client,
    api_key: String,
}

impl VastClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, api_key })
    }

    /// Search rentable offers; `query` follows the console's filter DSL.
    pub async fn search_offers(&self, query: &Value) -> Result<Vec<Offer>> {
        let response: OffersResponse = self
            .client
            .get(format!("{API_BASE}/bundles/"))
            .query(&[("q", query.to_string())])
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.offers)
    }

    /// All instances rented by this account.
    pub async fn list_instances(&self) -> Result<Vec<Instance>> {
        let response: InstancesResponse = self
            .client
            .get(format!("{API_BASE}/instances/"))
            .query(&[("owner", "me")])
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.instances)
    }

    /// Accept an ask (or place a bid) on an offer.
    pub async fn create_instance(&self, ask_id: i64, body: &Value) -> Result<()> {
        self.client
            .put(format!("{API_BASE}/asks/{ask_id}/"))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn destroy_instance(&self, instance_id: i64) -> Result<()> {
        self.client
            .delete(format!("{API_BASE}/instances/{instance_id}/"))
            .bearer_auth(&self.api_key)
            .json(&json!({}))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Pin an image reference to its immutable registry digest so hosts
    /// cannot serve a stale cached tag. Best-effort; callers fall back to
    /// the tag.
    pub async fn resolve_image_digest(&self, image: &str) -> Result<String> {
        let (repo, tag) = image
            .split_once(':')
            .ok_or_else(|| ScalerError::Image(format!("image has no tag: {image}")))?;
        let (registry, repository) = repo
            .split_once('/')
            .ok_or_else(|| ScalerError::Image(format!("image has no registry: {image}")))?;

        let token_response: Value = self
            .client
            .get(format!(
                "https://{registry}/token?scope=repository:{repository}:pull"
            ))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let token = token_response["token"]
            .as_str()
            .ok_or_else(|| ScalerError::Image("registry token missing".into()))?
            .to_string();

        let manifest = self
            .client
            .get(format!(
                "https://{registry}/v2/{repository}/manifests/{tag}"
            ))
            .bearer_auth(token)
            .header("Accept", "application/vnd.oci.image.index.v1+json")
            .send()
            .await?
            .error_for_status()?;

        match manifest.headers().get("Docker-Content-Digest") {
            Some(digest) => {
                let digest = digest
                    .to_str()
                    .map_err(|_| ScalerError::Image("non-ascii digest".into()))?;
                Ok(format!("{repo}@{digest}"))
            }
            None => Err(ScalerError::Image("could not find image digest".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostnames_are_machine_dot_host() {
        let raw = r#"{"id": 1, "machine_id": 123, "host_id": 456, "gpu_name": "RTX 3090", "gpu_ram": 24576, "dph_total": 0.2}"#;
        let offer: Offer = serde_json::from_str(raw).unwrap();
        assert_eq!(offer.hostname(), "123.456.vast.ai");
    }

    #[test]
    fn instance_env_lookup() {
        let raw = r#"{
            "id": 9, "machine_id": 1, "host_id": 2,
            "actual_status": "loading",
            "extra_env": [["CELERY_HOSTNAME", "celery-abc1234@1.2.vast.ai"], ["CELERY_CONCURRENCY", "2"]]
        }"#;
        let instance: Instance = serde_json::from_str(raw).unwrap();
        assert_eq!(
            instance.env("CELERY_HOSTNAME"),
            Some("celery-abc1234@1.2.vast.ai")
        );
        assert_eq!(instance.env("CELERY_CONCURRENCY"), Some("2"));
        assert!(!instance.is_running());
    }
}
