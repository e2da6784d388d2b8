//! Create job command
//!
//! Records a `queued` job for an uploaded file and hands it to the scheduler.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::features::FeatureState;
use crate::ingest::{Job, JobStatus, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobCommand {
    pub file_id: Uuid,
    /// Used as-is when present, otherwise resolved from the uploaded file record
    pub blob_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateJobError {
    #[error("File '{0}' not found")]
    FileNotFound(Uuid),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<CreateJobError> for AppError {
    fn from(err: CreateJobError) -> Self {
        match err {
            CreateJobError::FileNotFound(_) => AppError::NotFound(err.to_string()),
            CreateJobError::Store(e) => AppError::Store(e),
        }
    }
}

#[tracing::instrument(skip(state), fields(file_id = %command.file_id))]
pub async fn handle(
    state: &FeatureState,
    command: CreateJobCommand,
) -> Result<CreateJobResponse, CreateJobError> {
    let blob_ref = match command.blob_ref.filter(|b| !b.trim().is_empty()) {
        Some(blob_ref) => blob_ref,
        None => {
            state
                .files
                .get(command.file_id)
                .await?
                .ok_or(CreateJobError::FileNotFound(command.file_id))?
                .blob_ref
        }
    };

    let job = Job::queued(command.file_id, blob_ref);
    state.jobs.create(&job).await?;

    // the outcome is observable through the job record
    let _completion = state.scheduler.submit(job.queue_entry());

    tracing::info!(job_id = %job.id, blob_ref = %job.blob_ref, "Job queued");

    Ok(CreateJobResponse {
        job_id: job.id,
        status: job.status,
    })
}
