//! Core types for the ingestion pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Ingestion job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses are never left again by the same attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Statuses picked up by startup recovery
    pub fn unfinished() -> [JobStatus; 2] {
        [JobStatus::Queued, JobStatus::Running]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown job status: {0}")]
pub struct UnknownJobStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownJobStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(UnknownJobStatus(other.to_string())),
        }
    }
}

/// Ingestion job (maps to the ingestion_jobs table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub file_id: Uuid,
    /// Storage key of the object to ingest
    pub blob_ref: String,
    pub status: JobStatus,
    pub attempts: i32,
    pub processed_count: i64,
    pub failed_lines: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Last fatal error, set only when the job failed
    pub error: Option<String>,
}

impl Job {
    /// A fresh job in `queued` with zeroed counters
    pub fn queued(file_id: Uuid, blob_ref: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_id,
            blob_ref: blob_ref.into(),
            status: JobStatus::Queued,
            attempts: 0,
            processed_count: 0,
            failed_lines: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn queue_entry(&self) -> QueueEntry {
        QueueEntry {
            job_id: self.id,
            file_id: self.file_id,
            blob_ref: self.blob_ref.clone(),
        }
    }

    /// Apply a patch in place. Returns `false` and leaves the job untouched when the
    /// patch's status guard does not match.
    pub fn apply(&mut self, patch: &JobPatch) -> bool {
        if let Some(expected) = patch.expected_status {
            if self.status != expected {
                return false;
            }
        }

        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(started_at) = patch.started_at {
            self.started_at = Some(started_at);
        }
        if let Some(finished_at) = patch.finished_at {
            self.finished_at = Some(finished_at);
        }
        if let Some(ref error) = patch.error {
            self.error = Some(error.clone());
        }
        self.attempts += patch.attempts_delta;
        self.processed_count += patch.processed_delta;
        self.failed_lines += patch.failed_delta;

        true
    }
}

/// In-memory projection of a job waiting for a worker slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub job_id: Uuid,
    pub file_id: Uuid,
    pub blob_ref: String,
}

/// One structured record derived from one input line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecord {
    /// 1-based position of the line in the source stream, blank lines included
    pub line_number: u64,
    pub data: serde_json::Value,
}

/// Partial update of a job record.
///
/// Absolute fields overwrite, deltas are added atomically by the store. When
/// `expected_status` is set the update only applies if the stored status matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub attempts_delta: i32,
    pub processed_delta: i64,
    pub failed_delta: i64,
    pub expected_status: Option<JobStatus>,
}

impl JobPatch {
    /// Start an attempt. Only a queued job can be started.
    pub fn running(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Running),
            started_at: Some(now),
            attempts_delta: 1,
            ..Default::default()
        }
        .expect_status(JobStatus::Queued)
    }

    /// Put an interrupted attempt back in the queue
    pub fn requeued() -> Self {
        Self {
            status: Some(JobStatus::Queued),
            ..Default::default()
        }
        .expect_status(JobStatus::Running)
    }

    pub fn progress(processed: i64, failed: i64) -> Self {
        Self {
            processed_delta: processed,
            failed_delta: failed,
            ..Default::default()
        }
    }

    pub fn succeeded(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Succeeded),
            finished_at: Some(now),
            ..Default::default()
        }
    }

    pub fn failed(now: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            finished_at: Some(now),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Cancellation only lands on a job that is still queued
    pub fn cancelled(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Cancelled),
            finished_at: Some(now),
            ..Default::default()
        }
        .expect_status(JobStatus::Queued)
    }

    pub fn expect_status(mut self, status: JobStatus) -> Self {
        self.expected_status = Some(status);
        self
    }
}

/// Final result of one job, delivered to completion subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Counters cover this attempt only
    Succeeded { processed: u64, failed: u64 },
    Failed { error: String },
    Cancelled,
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Succeeded { .. } => JobStatus::Succeeded,
            JobOutcome::Failed { .. } => JobStatus::Failed,
            JobOutcome::Cancelled => JobStatus::Cancelled,
        }
    }
}

/// File accepted by the upload endpoint (maps to the uploaded_files table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: Uuid,
    pub blob_ref: String,
    pub original_name: String,
    pub size: i64,
    pub content_type: Option<String>,
    /// Hex-encoded SHA-256 of the uploaded bytes
    pub checksum: String,
    pub uploaded_at: DateTime<Utc>,
}
