//! Collaborator boundaries of the ingestion core
//!
//! The worker and scheduler only see these traits. Postgres and S3 implementations live
//! in [`crate::db`] and [`crate::storage`]; [`super::memory`] has in-process ones.

use async_trait::async_trait;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;
use uuid::Uuid;

use super::types::{Job, JobPatch, JobStatus, ParsedRecord, UploadedFile};

/// Errors raised by any store implementation
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Blob storage error: {0}")]
    Blob(#[from] anyhow::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Sequential byte stream over one stored object
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Result of writing an object to blob storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub key: String,
    pub size: i64,
    pub checksum: String,
}

/// Durable job records
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &Job) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Job>>;

    /// Jobs in any of `statuses`, oldest `created_at` first
    async fn find_by_status(
        &self,
        statuses: &[JobStatus],
        limit: Option<i64>,
    ) -> StoreResult<Vec<Job>>;

    /// Apply `patch` atomically. Returns the updated job, or `None` when the job does not
    /// exist or the patch's status guard did not match.
    async fn update(&self, id: Uuid, patch: &JobPatch) -> StoreResult<Option<Job>>;
}

/// Schemaless destination for parsed records
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Unordered bulk insert. Any error means the whole batch is treated as failed.
    async fn insert_batch(
        &self,
        file_id: Uuid,
        job_id: Uuid,
        records: &[ParsedRecord],
    ) -> StoreResult<()>;
}

/// Object storage holding uploaded files
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn open(&self, blob_ref: &str) -> StoreResult<BlobReader>;

    async fn put(
        &self,
        blob_ref: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> StoreResult<StoredBlob>;
}

/// Records of uploaded files
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn create(&self, file: &UploadedFile) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<UploadedFile>>;
}
