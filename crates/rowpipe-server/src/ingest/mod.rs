//! File ingestion pipeline
//!
//! ```text
//! submit ──► JobScheduler ──(slot free)──► IngestionWorker
//!                                            │  BlobStore::open
//!                                            │  parse_line per line
//!                                            │  RecordSink::insert_batch per batch
//!                                            └► JobStore::update (counters, status)
//! ```
//!
//! The core depends only on the traits in [`store`]. Postgres and S3 implementations are
//! in [`crate::db`] and [`crate::storage`]; [`memory`] provides in-process ones.

pub mod config;
pub mod memory;
pub mod parser;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod worker;

pub use config::{IngestConfig, WorkerConfig};
pub use parser::{parse_line, HeaderState};
pub use scheduler::{Completion, JobScheduler, SchedulerError, SchedulerStats};
pub use store::{
    BlobReader, BlobStore, FileStore, JobStore, RecordSink, StoreError, StoreResult, StoredBlob,
};
pub use types::{Job, JobOutcome, JobPatch, JobStatus, ParsedRecord, QueueEntry, UploadedFile};
pub use worker::{IngestError, IngestionWorker, JobProcessor, RunStats};
