//! In-process store implementations
//!
//! Used by the test suites and handy for running the pipeline without Postgres or S3.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::store::{
    BlobReader, BlobStore, FileStore, JobStore, RecordSink, StoreError, StoreResult, StoredBlob,
};
use super::types::{Job, JobPatch, JobStatus, ParsedRecord, UploadedFile};
use crate::storage::calculate_sha256;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Job records kept in insertion order
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<Vec<Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Job> {
        lock(&self.jobs).clone()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> StoreResult<()> {
        lock(&self.jobs).push(job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Job>> {
        Ok(lock(&self.jobs).iter().find(|job| job.id == id).cloned())
    }

    async fn find_by_status(
        &self,
        statuses: &[JobStatus],
        limit: Option<i64>,
    ) -> StoreResult<Vec<Job>> {
        let mut found: Vec<Job> = lock(&self.jobs)
            .iter()
            .filter(|job| statuses.contains(&job.status))
            .cloned()
            .collect();
        found.sort_by_key(|job| job.created_at);

        if let Some(limit) = limit {
            found.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        }

        Ok(found)
    }

    async fn update(&self, id: Uuid, patch: &JobPatch) -> StoreResult<Option<Job>> {
        let mut jobs = lock(&self.jobs);
        let Some(job) = jobs.iter_mut().find(|job| job.id == id) else {
            return Ok(None);
        };

        Ok(job.apply(patch).then(|| job.clone()))
    }
}

/// A record as persisted by [`MemoryRecordSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub file_id: Uuid,
    pub job_id: Uuid,
    pub line_number: u64,
    pub data: serde_json::Value,
}

/// Record sink keyed by `(job_id, line_number)`; re-inserting the same line is a no-op
#[derive(Default)]
pub struct MemoryRecordSink {
    records: Mutex<Vec<StoredRecord>>,
    seen: Mutex<HashSet<(Uuid, u64)>>,
    calls: AtomicUsize,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<StoredRecord> {
        lock(&self.records).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn insert_batch(
        &self,
        file_id: Uuid,
        job_id: Uuid,
        records: &[ParsedRecord],
    ) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut seen = lock(&self.seen);
        let mut stored = lock(&self.records);
        for record in records {
            if seen.insert((job_id, record.line_number)) {
                stored.push(StoredRecord {
                    file_id,
                    job_id,
                    line_number: record.line_number,
                    data: record.data.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Objects held as byte vectors
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        lock(&self.objects).insert(key.into(), data.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.objects).contains_key(key)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn open(&self, blob_ref: &str) -> StoreResult<BlobReader> {
        let data = lock(&self.objects)
            .get(blob_ref)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Object '{}' not found", blob_ref)))?;

        Ok(Box::pin(Cursor::new(data)))
    }

    async fn put(
        &self,
        blob_ref: &str,
        data: Vec<u8>,
        _content_type: Option<String>,
    ) -> StoreResult<StoredBlob> {
        let stored = StoredBlob {
            key: blob_ref.to_string(),
            size: data.len() as i64,
            checksum: calculate_sha256(&data),
        };
        lock(&self.objects).insert(blob_ref.to_string(), data);
        Ok(stored)
    }
}

#[derive(Default)]
pub struct MemoryFileStore {
    files: Mutex<HashMap<Uuid, UploadedFile>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn create(&self, file: &UploadedFile) -> StoreResult<()> {
        lock(&self.files).insert(file.id, file.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<UploadedFile>> {
        Ok(lock(&self.files).get(&id).cloned())
    }
}
