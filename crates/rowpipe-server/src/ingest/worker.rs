//! Ingestion worker
//!
//! Drives one job end to end: marks it running, streams the blob line by line through
//! the parser, writes records in batches and finalizes the job status.
//!
//! Fault handling follows three tiers:
//!
//! - a line that is not valid UTF-8, or longer than `max_line_bytes`, counts as one
//!   failed line
//! - a rejected or timed-out bulk insert counts the whole batch as failed, then backs off
//! - failing to open or read the blob, or to persist the job record, fails the job
//!
//! A job whose record is no longer `queued` when the worker picks it up is skipped and
//! left as it is.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::config::WorkerConfig;
use super::parser::{parse_line, HeaderState};
use super::store::{BlobStore, JobStore, RecordSink, StoreError};
use super::types::{JobOutcome, JobPatch, JobStatus, ParsedRecord, QueueEntry};

/// Fatal faults that end a job as `failed`
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to open blob '{blob_ref}': {source}")]
    BlobOpen {
        blob_ref: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to read line {line}: {source}")]
    Read {
        line: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out reading line {line} after {after:?}")]
    ReadTimeout { line: u64, after: Duration },

    #[error("Failed to update job record: {0}")]
    Persist(#[from] StoreError),

    #[error("Job {0} no longer exists")]
    JobMissing(Uuid),

    #[error("Job {job_id} is {status}, not queued")]
    NotQueued { job_id: Uuid, status: JobStatus },
}

/// Anything the scheduler can hand a job to
#[async_trait]
pub trait JobProcessor: Send + Sync {
    /// Run the job to completion. Never panics on job-level faults; they are reported
    /// through the outcome.
    async fn process(&self, entry: QueueEntry) -> JobOutcome;
}

/// Counters for one attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub lines_read: u64,
    pub processed: u64,
    pub failed: u64,
}

pub struct IngestionWorker {
    jobs: Arc<dyn JobStore>,
    sink: Arc<dyn RecordSink>,
    blobs: Arc<dyn BlobStore>,
    config: WorkerConfig,
}

impl IngestionWorker {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        sink: Arc<dyn RecordSink>,
        blobs: Arc<dyn BlobStore>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            jobs,
            sink,
            blobs,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Process one job and return this attempt's counters
    #[instrument(skip(self, entry), fields(job_id = %entry.job_id, blob_ref = %entry.blob_ref))]
    pub async fn run(&self, entry: &QueueEntry) -> Result<RunStats, IngestError> {
        self.start(entry.job_id).await?;

        let stream = self
            .blobs
            .open(&entry.blob_ref)
            .await
            .map_err(|source| IngestError::BlobOpen {
                blob_ref: entry.blob_ref.clone(),
                source,
            })?;
        let mut reader = BufReader::new(stream);

        let batch_size = self.config.batch_size.max(1);
        let mut header = HeaderState::new();
        let mut batch: Vec<ParsedRecord> = Vec::with_capacity(batch_size);
        let mut stats = RunStats::default();
        let mut rejected = 0u64;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let line_number = stats.lines_read + 1;
            let read = self.read_line(&mut reader, &mut buf, line_number).await?;
            if read == LineRead::Eof {
                break;
            }
            stats.lines_read = line_number;

            if let LineRead::TooLong(len) = read {
                warn!(
                    job_id = %entry.job_id,
                    line = line_number,
                    len,
                    max = self.config.max_line_bytes,
                    "Skipping line longer than the limit"
                );
                header.skip_detection();
                rejected += 1;
                continue;
            }

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(e) => {
                    warn!(
                        job_id = %entry.job_id,
                        line = line_number,
                        error = %e,
                        "Skipping line that is not valid UTF-8"
                    );
                    header.skip_detection();
                    rejected += 1;
                    continue;
                }
            };

            if let Some(data) = parse_line(line, &mut header, self.config.delimiter) {
                batch.push(ParsedRecord { line_number, data });
            }

            if batch.len() >= batch_size {
                self.flush(entry, &mut batch, &mut rejected, &mut stats).await?;
            }
        }

        self.flush(entry, &mut batch, &mut rejected, &mut stats).await?;
        self.persist(entry.job_id, JobPatch::succeeded(Utc::now())).await?;

        Ok(stats)
    }

    /// Move a queued job to `running`. A guard miss means the record was cancelled or
    /// finished since the job was queued.
    async fn start(&self, job_id: Uuid) -> Result<(), IngestError> {
        if self
            .jobs
            .update(job_id, &JobPatch::running(Utc::now()))
            .await?
            .is_some()
        {
            return Ok(());
        }

        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or(IngestError::JobMissing(job_id))?;
        Err(IngestError::NotQueued {
            job_id,
            status: job.status,
        })
    }

    async fn read_line<R>(
        &self,
        reader: &mut R,
        buf: &mut Vec<u8>,
        line: u64,
    ) -> Result<LineRead, IngestError>
    where
        R: AsyncBufRead + Unpin,
    {
        let read = read_bounded(reader, buf, self.config.max_line_bytes);
        let result = match self.config.read_timeout {
            Some(after) => tokio::time::timeout(after, read)
                .await
                .map_err(|_| IngestError::ReadTimeout { line, after })?,
            None => read.await,
        };

        result.map_err(|source| IngestError::Read { line, source })
    }

    /// Write the pending batch and persist counter deltas, including lines rejected
    /// before parsing since the last flush.
    async fn flush(
        &self,
        entry: &QueueEntry,
        batch: &mut Vec<ParsedRecord>,
        rejected: &mut u64,
        stats: &mut RunStats,
    ) -> Result<(), IngestError> {
        let mut processed = 0u64;
        let mut failed = std::mem::take(rejected);

        if !batch.is_empty() {
            match self.write_batch(entry, batch).await {
                Ok(()) => processed = batch.len() as u64,
                Err(e) => {
                    warn!(
                        job_id = %entry.job_id,
                        batch_size = batch.len(),
                        first_line = batch[0].line_number,
                        error = %e,
                        "Bulk insert failed, counting the whole batch as failed"
                    );
                    failed += batch.len() as u64;
                    tokio::time::sleep(self.config.failure_backoff).await;
                }
            }
        }

        if processed > 0 || failed > 0 {
            self.persist(
                entry.job_id,
                JobPatch::progress(processed as i64, failed as i64),
            )
            .await?;
            stats.processed += processed;
            stats.failed += failed;
        }

        batch.clear();
        Ok(())
    }

    async fn write_batch(
        &self,
        entry: &QueueEntry,
        batch: &[ParsedRecord],
    ) -> Result<(), StoreError> {
        let insert = self.sink.insert_batch(entry.file_id, entry.job_id, batch);
        match self.config.write_timeout {
            Some(after) => tokio::time::timeout(after, insert)
                .await
                .map_err(|_| StoreError::Timeout(after))?,
            None => insert.await,
        }
    }

    async fn persist(&self, job_id: Uuid, patch: JobPatch) -> Result<(), IngestError> {
        self.jobs
            .update(job_id, &patch)
            .await?
            .map(|_| ())
            .ok_or(IngestError::JobMissing(job_id))
    }
}

#[async_trait]
impl JobProcessor for IngestionWorker {
    async fn process(&self, entry: QueueEntry) -> JobOutcome {
        match self.run(&entry).await {
            Ok(stats) => {
                info!(
                    job_id = %entry.job_id,
                    lines = stats.lines_read,
                    processed = stats.processed,
                    failed = stats.failed,
                    "Ingestion job succeeded"
                );
                JobOutcome::Succeeded {
                    processed: stats.processed,
                    failed: stats.failed,
                }
            }
            Err(IngestError::NotQueued { job_id, status }) => {
                info!(job_id = %job_id, status = %status, "Job is no longer queued, skipping");
                skipped_outcome(job_id, status)
            }
            Err(e) => {
                let message = e.to_string();
                error!(job_id = %entry.job_id, error = %message, "Ingestion job failed");

                if let Err(persist) = self
                    .jobs
                    .update(entry.job_id, &JobPatch::failed(Utc::now(), message.clone()))
                    .await
                {
                    error!(
                        job_id = %entry.job_id,
                        error = %persist,
                        "Failed to record job failure"
                    );
                }

                JobOutcome::Failed { error: message }
            }
        }
    }
}

/// Outcome reported for a job that was never started
fn skipped_outcome(job_id: Uuid, status: JobStatus) -> JobOutcome {
    match status {
        JobStatus::Cancelled => JobOutcome::Cancelled,
        JobStatus::Succeeded => JobOutcome::Succeeded {
            processed: 0,
            failed: 0,
        },
        _ => JobOutcome::Failed {
            error: IngestError::NotQueued { job_id, status }.to_string(),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineRead {
    Eof,
    Line,
    /// Consumed and dropped; holds the byte length including the terminator
    TooLong(usize),
}

/// Read one line into `buf` without its terminator, buffering at most `max` content
/// bytes. The rest of an over-long line is consumed and discarded.
async fn read_bounded<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    // content plus a CRLF terminator
    let cap = max.saturating_add(2);
    let mut total = 0usize;
    let mut overflow = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }

        let (used, complete) = match available.iter().position(|b| *b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        if !overflow {
            buf.extend_from_slice(&available[..used]);
            if buf.len() > cap {
                overflow = true;
                buf.clear();
            }
        }
        reader.consume(used);
        total += used;

        if complete {
            break;
        }
    }

    if total == 0 {
        return Ok(LineRead::Eof);
    }
    if !overflow {
        trim_line_ending(buf);
        if buf.len() <= max {
            return Ok(LineRead::Line);
        }
        buf.clear();
    }
    Ok(LineRead::TooLong(total))
}

fn trim_line_ending(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
}
