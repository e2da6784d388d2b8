//! Rowpipe Server Library
//!
//! Ingests uploaded text files line by line into a schemaless record store.
//!
//! # Overview
//!
//! - **Ingestion core** ([`ingest`]): line parser, streaming worker and a
//!   bounded-concurrency scheduler that recovers unfinished jobs on startup
//! - **Stores**: Postgres ([`db`]) for job, file and record tables, S3-compatible
//!   object storage ([`storage`]) for uploaded bytes
//! - **API** ([`features`], [`api`]): upload, submit for processing, job status and
//!   cancellation
//! - **Configuration** ([`config`]): environment-driven with validated defaults
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rowpipe_server::ingest::{
//!     memory::{MemoryBlobStore, MemoryJobStore, MemoryRecordSink},
//!     IngestionWorker, Job, JobScheduler, JobStore, WorkerConfig,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let jobs = Arc::new(MemoryJobStore::new());
//! let blobs = Arc::new(MemoryBlobStore::new());
//! blobs.insert("uploads/demo/people.csv", "name,age\nAda,30\n");
//!
//! let worker = IngestionWorker::new(
//!     jobs.clone(),
//!     Arc::new(MemoryRecordSink::new()),
//!     blobs,
//!     WorkerConfig::default(),
//! );
//! let scheduler = JobScheduler::new(Arc::new(worker), jobs.clone(), 2);
//!
//! let job = Job::queued(uuid::Uuid::new_v4(), "uploads/demo/people.csv");
//! jobs.create(&job).await?;
//! let outcome = scheduler.submit(job.queue_entry()).wait().await;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod storage;

pub use error::{ApiResult, AppError};
