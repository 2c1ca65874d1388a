//! S3-compatible object storage on `rust-s3`.
//!
//! Path-style addressing for MinIO and friends. Exact-version downloads need
//! a bucket with versioning enabled.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use domain::services::ObjectStore;
use domain::DeliveryError;
use reqwest::{header, Client, StatusCode, Url};
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::StorageConfig;

const VERSION_HEADER: &str = "x-amz-version-id";

/// Longest expiry S3 accepts for a presigned URL.
const MAX_PRESIGN_SECS: u64 = 604_800;

/// Expiry of the presigned URL behind a version check.
const CHECK_EXPIRY_SECS: u32 = 60;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("Invalid storage endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid storage credentials: {0}")]
    Credentials(String),

    #[error("Storage client error: {0}")]
    Client(S3Error),

    #[error("Storage request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Storage returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<S3Error> for ObjectStoreError {
    fn from(err: S3Error) -> Self {
        match err {
            S3Error::HttpFailWithBody(status, body) => ObjectStoreError::Status { status, body },
            other => ObjectStoreError::Client(other),
        }
    }
}

impl From<ObjectStoreError> for DeliveryError {
    fn from(err: ObjectStoreError) -> Self {
        DeliveryError::Storage(err.to_string())
    }
}

/// Version id from PUT response headers.
fn version_from(headers: &HashMap<String, String>) -> Option<String> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(VERSION_HEADER))
        .map(|(_, value)| value.clone())
        .filter(|value| !value.is_empty())
}

/// Archive bucket on an S3-compatible store.
pub struct S3ObjectStore {
    bucket: Box<Bucket>,
    /// Issues the ranged GET behind version checks.
    client: Client,
}

impl S3ObjectStore {
    pub fn new(config: &StorageConfig) -> Result<Self, ObjectStoreError> {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        let url = Url::parse(&endpoint)
            .map_err(|e| ObjectStoreError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if url.host_str().is_none() {
            return Err(ObjectStoreError::InvalidEndpoint(format!(
                "{} has no host",
                endpoint
            )));
        }

        let credentials = Credentials::new(
            Some(config.access_key.as_str()),
            Some(config.secret_key.as_str()),
            None,
            None,
            None,
        )
        .map_err(|e| ObjectStoreError::Credentials(e.to_string()))?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint,
        };
        let mut bucket = Bucket::new(&config.bucket, region, credentials)?;
        bucket.set_path_style();

        Ok(Self {
            bucket,
            client: Client::builder().timeout(Duration::from_secs(60)).build()?,
        })
    }

    /// Presigned GET for one object version.
    async fn version_url(
        &self,
        key: &str,
        version: &str,
        expiry_secs: u32,
    ) -> Result<String, ObjectStoreError> {
        let mut queries = HashMap::new();
        queries.insert("versionId".to_string(), version.to_string());
        Ok(self
            .bucket
            .presign_get(key, expiry_secs, Some(queries))
            .await?)
    }

    async fn put_object(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(ObjectStoreError::Status {
                status,
                body: String::from_utf8_lossy(response.as_slice()).into_owned(),
            });
        }

        match version_from(&response.headers()) {
            Some(version) => Ok(version),
            None => {
                // Unversioned buckets report the "null" version.
                warn!(bucket = %self.bucket.name(), key, "Bucket returned no version id");
                Ok("null".to_string())
            }
        }
    }

    /// `HeadObject` in `rust-s3` has no version parameter, so the check reads
    /// the first byte of the exact version through a presigned URL.
    async fn version_exists(&self, key: &str, version: &str) -> Result<bool, ObjectStoreError> {
        let url = self.version_url(key, version, CHECK_EXPIRY_SECS).await?;
        let response = self
            .client
            .get(url)
            .header(header::RANGE, "bytes=0-0")
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            // Zero-length object.
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => Ok(false),
            status => Err(ObjectStoreError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, DeliveryError> {
        let version = self.put_object(key, &data, content_type).await?;
        debug!(
            bucket = %self.bucket.name(),
            key,
            size = data.len(),
            version = %version,
            "Stored object"
        );
        Ok(version)
    }

    async fn exists(&self, key: &str, version: &str) -> Result<bool, DeliveryError> {
        Ok(self.version_exists(key, version).await?)
    }

    async fn presign_get(
        &self,
        key: &str,
        version: &str,
        ttl: Duration,
    ) -> Result<String, DeliveryError> {
        let expiry = ttl.as_secs().clamp(1, MAX_PRESIGN_SECS) as u32;
        Ok(self.version_url(key, version, expiry).await?)
    }
}
