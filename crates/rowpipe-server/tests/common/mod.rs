//! Shared helpers for rowpipe server integration tests
//!
//! - [`Harness`]: in-memory stores wired to an [`IngestionWorker`]
//! - [`FlakyJobStore`], [`FlakyRecordSink`]: memory stores with switchable faults
//! - [`GatedProcessor`]: a [`JobProcessor`] whose jobs finish only when released
//! - [`TestPostgres`]: a PostgreSQL container with migrations applied (requires Docker)

#![allow(dead_code)]

mod faults;

pub use faults::{FlakyJobStore, FlakyRecordSink};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use rowpipe_server::ingest::{
    memory::{MemoryBlobStore, MemoryFileStore},
    IngestionWorker, Job, JobOutcome, JobProcessor, JobStore, QueueEntry, WorkerConfig,
};

/// Initialize tracing for tests; safe to call more than once
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,rowpipe_server=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

// ============================================================================
// In-memory harness
// ============================================================================

pub struct Harness {
    pub jobs: Arc<FlakyJobStore>,
    pub sink: Arc<FlakyRecordSink>,
    pub blobs: Arc<MemoryBlobStore>,
    pub files: Arc<MemoryFileStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(FlakyJobStore::new()),
            sink: Arc::new(FlakyRecordSink::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            files: Arc::new(MemoryFileStore::new()),
        }
    }

    pub fn worker(&self, config: WorkerConfig) -> IngestionWorker {
        IngestionWorker::new(
            self.jobs.clone(),
            self.sink.clone(),
            self.blobs.clone(),
            config,
        )
    }

    /// Store `content` as a blob and create a queued job pointing at it
    pub async fn queued_job(&self, content: impl Into<Vec<u8>>) -> Job {
        let file_id = Uuid::new_v4();
        let key = format!("uploads/{}/input.txt", file_id);
        self.blobs.insert(key.clone(), content);

        let job = Job::queued(file_id, key);
        self.jobs.create(&job).await.expect("create job");
        job
    }

    pub async fn job(&self, id: Uuid) -> Job {
        self.jobs.get(id).await.expect("get job").expect("job exists")
    }
}

/// Worker settings for tests: given batch size, no backoff
pub fn test_config(batch_size: usize) -> WorkerConfig {
    WorkerConfig::default()
        .with_batch_size(batch_size)
        .with_failure_backoff(Duration::ZERO)
}

/// Insert a queued job whose `created_at` is `age_secs` in the past
pub async fn aged_job(store: &FlakyJobStore, age_secs: i64) -> Job {
    let mut job = Job::queued(Uuid::new_v4(), "uploads/aged/input.txt");
    job.created_at = Utc::now() - ChronoDuration::seconds(age_secs);
    store.create(&job).await.expect("create job");
    job
}

// ============================================================================
// Gated processor
// ============================================================================

/// Processor that reports each start and blocks until the test releases the job
pub struct GatedProcessor {
    started: mpsc::UnboundedSender<Uuid>,
    gates: Mutex<HashMap<Uuid, oneshot::Receiver<()>>>,
    releases: Mutex<HashMap<Uuid, oneshot::Sender<()>>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl GatedProcessor {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Uuid>) {
        let (started, started_rx) = mpsc::unbounded_channel();
        let processor = Arc::new(Self {
            started,
            gates: Mutex::new(HashMap::new()),
            releases: Mutex::new(HashMap::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        });
        (processor, started_rx)
    }

    /// Prepare a gate for `job_id`; must be called before the job starts
    pub fn gate(&self, job_id: Uuid) {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(job_id, rx);
        self.releases.lock().unwrap().insert(job_id, tx);
    }

    pub fn release(&self, job_id: Uuid) {
        if let Some(tx) = self.releases.lock().unwrap().remove(&job_id) {
            let _ = tx.send(());
        }
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobProcessor for GatedProcessor {
    async fn process(&self, entry: QueueEntry) -> JobOutcome {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let _ = self.started.send(entry.job_id);

        let gate = self.gates.lock().unwrap().remove(&entry.job_id);
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        JobOutcome::Succeeded {
            processed: 0,
            failed: 0,
        }
    }
}

/// Receive the next start notification or panic after a second
pub async fn next_start(rx: &mut mpsc::UnboundedReceiver<Uuid>) -> Uuid {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("a job should have started")
        .expect("processor alive")
}

/// Assert that no job starts within a short window
pub async fn assert_no_start(rx: &mut mpsc::UnboundedReceiver<Uuid>) {
    let result = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(result.is_err(), "no job should have started, got {:?}", result);
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with migrations applied
pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        rowpipe_server::db::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self { container, pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
