//! S3-compatible object storage for uploaded files

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::ingest::store::{BlobReader, BlobStore, StoreResult, StoredBlob};

pub mod config;

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(config: config::StorageConfig) -> Result<Self> {
        debug!(
            endpoint = ?config.endpoint,
            region = %config.region,
            path_style = config.path_style,
            "Initializing storage"
        );

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "rowpipe-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(bucket = %config.bucket, "Storage client initialized");

        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self, data))]
    pub async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<StoredBlob> {
        let checksum = calculate_sha256(&data);
        let size = data.len() as i64;

        debug!("Uploading {} bytes to s3://{}/{}", size, self.bucket, key);

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data));

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request.send().await.context("Failed to upload to S3")?;

        info!("Successfully uploaded to s3://{}/{}", self.bucket, key);

        Ok(StoredBlob {
            key: key.to_string(),
            size,
            checksum,
        })
    }

    /// Streaming body of an object; nothing is buffered beyond what the reader pulls
    #[instrument(skip(self))]
    pub async fn download_stream(&self, key: &str) -> Result<ByteStream> {
        debug!("Getting stream from s3://{}/{}", self.bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to get stream from S3: {}", key))?;

        Ok(response.body)
    }
}

#[async_trait]
impl BlobStore for Storage {
    async fn open(&self, blob_ref: &str) -> StoreResult<BlobReader> {
        let body = self.download_stream(blob_ref).await?;
        Ok(Box::pin(body.into_async_read()))
    }

    async fn put(
        &self,
        blob_ref: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> StoreResult<StoredBlob> {
        Ok(self.upload(blob_ref, data, content_type).await?)
    }
}

/// Object key for an uploaded file: `uploads/{file_id}/{name}`
pub fn build_upload_key(file_id: Uuid, original_name: &str) -> String {
    format!("uploads/{}/{}", file_id, original_name)
}

/// Hex-encoded SHA-256 digest
pub fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_upload_key() {
        let id = Uuid::nil();
        assert_eq!(
            build_upload_key(id, "people.csv"),
            "uploads/00000000-0000-0000-0000-000000000000/people.csv"
        );
    }

    #[test]
    fn test_calculate_sha256() {
        let data = b"Hello, World!";
        let checksum = calculate_sha256(data);
        assert_eq!(
            checksum,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }
}
