//! Object store
//!
//! [`ObjectStore`] is the seam the use cases depend on. [`S3Storage`] backs it
//! with any S3-compatible service; [`memory::MemoryStorage`] backs it in tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncRead;
use tracing::{debug, info, instrument};

pub mod config;
pub mod memory;

/// Streaming body of a stored object
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub key: String,
    /// Hex SHA-256 of the uploaded bytes
    pub checksum: String,
    pub size: usize,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, replacing any existing object
    async fn put(&self, key: &str, data: Vec<u8>, content_type: Option<&str>)
        -> Result<UploadResult>;

    /// Open a read stream over the object at `key`
    async fn get_reader(&self, key: &str) -> Result<ObjectReader>;

    /// Credential-free GET URL for `key`, valid for `expires_in`
    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> Result<String>;
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(config: config::StorageConfig) -> Self {
        debug!(
            endpoint = ?config.endpoint,
            region = %config.region,
            bucket = %config.bucket,
            "Initializing object storage"
        );

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "chunkflow-storage",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!(bucket = %config.bucket, "Storage client initialized");

        Self {
            client,
            bucket: config.bucket,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    #[instrument(skip(self, data), fields(bucket = %self.bucket, size = data.len()))]
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<UploadResult> {
        let checksum = calculate_sha256(&data);
        let size = data.len();

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data));

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request
            .send()
            .await
            .with_context(|| format!("Failed to upload s3://{}/{}", self.bucket, key))?;

        debug!("Uploaded {} bytes to s3://{}/{}", size, self.bucket, key);

        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get_reader(&self, key: &str) -> Result<ObjectReader> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to open s3://{}/{}", self.bucket, key))?;

        Ok(Box::pin(response.body.into_async_read()))
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn presigned_get_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presigning_config = PresigningConfig::expires_in(expires_in)
            .context("Failed to create presigning config")?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .with_context(|| format!("Failed to presign s3://{}/{}", self.bucket, key))?;

        Ok(request.uri().to_string())
    }
}

pub(crate) fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_sha256() {
        assert_eq!(
            calculate_sha256(b"Hello, World!"),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn test_new_keeps_bucket() {
        let storage = S3Storage::new(config::StorageConfig::for_minio(
            "http://localhost:9000",
            "uploads",
        ));
        assert_eq!(storage.bucket(), "uploads");
    }
}
