//! Store wrappers that fail or stall on demand

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use rowpipe_server::ingest::{
    memory::{MemoryJobStore, MemoryRecordSink, StoredRecord},
    Job, JobPatch, JobStatus, JobStore, ParsedRecord, RecordSink, StoreError, StoreResult,
};

/// [`MemoryJobStore`] whose updates can be switched to fail
#[derive(Default)]
pub struct FlakyJobStore {
    inner: MemoryJobStore,
    fail_updates: AtomicBool,
}

impl FlakyJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `update` fail
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobStore for FlakyJobStore {
    async fn create(&self, job: &Job) -> StoreResult<()> {
        self.inner.create(job).await
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Job>> {
        self.inner.get(id).await
    }

    async fn find_by_status(
        &self,
        statuses: &[JobStatus],
        limit: Option<i64>,
    ) -> StoreResult<Vec<Job>> {
        self.inner.find_by_status(statuses, limit).await
    }

    async fn update(&self, id: Uuid, patch: &JobPatch) -> StoreResult<Option<Job>> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("job store rejected update".to_string()));
        }
        self.inner.update(id, patch).await
    }
}

/// [`MemoryRecordSink`] that can reject chosen calls or sleep before every call
#[derive(Default)]
pub struct FlakyRecordSink {
    inner: MemoryRecordSink,
    calls: AtomicUsize,
    failing_calls: Mutex<HashSet<usize>>,
    delay: Mutex<Option<Duration>>,
}

impl FlakyRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `call`-th invocation of `insert_batch` (1-based)
    pub fn fail_call(&self, call: usize) {
        self.failing_calls.lock().unwrap().insert(call);
    }

    /// Sleep this long inside every `insert_batch`
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn records(&self) -> Vec<StoredRecord> {
        self.inner.records()
    }

    /// Calls made, rejected ones included
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSink for FlakyRecordSink {
    async fn insert_batch(
        &self,
        file_id: Uuid,
        job_id: Uuid,
        records: &[ParsedRecord],
    ) -> StoreResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_calls.lock().unwrap().contains(&call) {
            return Err(StoreError::Unavailable(format!(
                "insert_batch call {} rejected",
                call
            )));
        }

        self.inner.insert_batch(file_id, job_id, records).await
    }
}
