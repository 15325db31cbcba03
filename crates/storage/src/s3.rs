//! S3-compatible object storage over plain reqwest with SigV4 signing.
//!
//! Uploads are path-style against `S3_ENDPOINT` so MinIO and AWS both work;
//! objects get a public-read ACL and are addressed through `S3_PUBLIC_URL`.

use std::env;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use trunkscribe_metadata::Metadata;

use crate::conversion::convert_to_mp3;
use crate::{Result, StorageError};

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC-SHA256 key length valid");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub public_url: String,
}

impl S3Config {
    pub fn from_env() -> Result<Self> {
        let required = |name: &str| {
            env::var(name).map_err(|_| StorageError::Config(format!("{name} env must be set")))
        };
        Ok(Self {
            endpoint: required("S3_ENDPOINT")?.trim_end_matches('/').to_string(),
            bucket: required("S3_BUCKET")?,
            region: env::var("AWS_DEFAULT_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            access_key: required("AWS_ACCESS_KEY_ID")?,
            secret_key: required("AWS_SECRET_ACCESS_KEY")?,
            public_url: env::var("S3_PUBLIC_URL")
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

/// Object key for a call's audio, derived from its start time in UTC.
pub fn object_key(metadata: &Metadata) -> Result<String> {
    let start_time = DateTime::<Utc>::from_timestamp(metadata.start_time, 0).ok_or_else(|| {
        StorageError::InvalidMetadata(format!("bad start_time {}", metadata.start_time))
    })?;
    Ok(format!(
        "{}_{}_{}.mp3",
        start_time.format("%Y/%m/%d/%H/%Y%m%d_%H%M%S"),
        metadata.short_name,
        metadata.talkgroup
    ))
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

pub struct BlobStorage {
    config: S3Config,
    client: reqwest::Client,
}

impl BlobStorage {
    pub fn new(config: S3Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(S3Config::from_env()?)
    }

    /// SigV4-signed PUT with a public-read ACL. Returns the public URL.
    pub async fn upload_file(&self, local: &Path, remote_path: &str) -> Result<String> {
        let data = tokio::fs::read(local).await?;
        let content_type = content_type_for(remote_path);

        let now = Utc::now();
        let date_str = now.format("%Y%m%d").to_string();
        let datetime_str = now.format("%Y%m%dT%H%M%SZ").to_string();

        let host = self
            .config
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string();
        let path = format!("/{}/{}", self.config.bucket, remote_path);
        let url = format!("{}{}", self.config.endpoint, path);

        let payload_hash = sha256_hex(&data);

        let signed_headers = "content-type;host;x-amz-acl;x-amz-content-sha256;x-amz-date";
        let canonical_headers = format!(
            "content-type:{content_type}\nhost:{host}\nx-amz-acl:public-read\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{datetime_str}\n"
        );
        let canonical_request =
            format!("PUT\n{path}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}");

        let credential_scope = format!("{date_str}/{}/s3/aws4_request", self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{datetime_str}\n{credential_scope}\n{}",
            sha256_hex(canonical_request.as_bytes())
        );

        let signing_key =
            derive_signing_key(&self.config.secret_key, &date_str, &self.config.region, "s3");
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope},SignedHeaders={signed_headers},Signature={signature}",
            self.config.access_key
        );

        let response = self
            .client
            .put(&url)
            .header("Authorization", authorization)
            .header("Content-Type", content_type)
            .header("x-amz-acl", "public-read")
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &datetime_str)
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Upload(format!("{status}: {body}")));
        }

        Ok(format!("{}/{}", self.config.public_url, remote_path))
    }

    /// Convert the call audio to mp3 and upload it under its derived key.
    /// The intermediate mp3 is removed before returning.
    pub async fn upload_raw_audio(&self, metadata: &Metadata, audio: &Path) -> Result<String> {
        let remote_path = object_key(metadata)?;
        let mp3 = convert_to_mp3(audio, Some(metadata)).await?;
        let uploaded = self.upload_file(&mp3, &remote_path).await;
        if let Err(err) = tokio::fs::remove_file(&mp3).await {
            tracing::warn!(path = %mp3.display(), %err, "failed to remove converted mp3");
        }
        uploaded
    }

    /// Stream a call's audio into `dest`, chunk by chunk.
    pub async fn fetch_audio(&self, audio_url: &str, dest: &Path) -> Result<PathBuf> {
        let response = self
            .client
            .get(audio_url)
            .send()
            .await?
            .error_for_status()?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        Ok(dest.to_path_buf())
    }
}
