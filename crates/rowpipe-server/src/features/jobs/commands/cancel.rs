//! Cancel job command

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiResult, AppError};
use crate::features::FeatureState;
use crate::ingest::{JobPatch, JobStatus, SchedulerError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelJobCommand {
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Cancel a job that no worker has picked up yet.
///
/// 404 for unknown jobs, 409 for jobs that are running or already finished.
#[tracing::instrument(skip(state), fields(job_id = %command.job_id))]
pub async fn handle(state: &FeatureState, command: CancelJobCommand) -> ApiResult<CancelJobResponse> {
    let job_id = command.job_id;
    let cancelled = CancelJobResponse {
        job_id,
        status: JobStatus::Cancelled,
    };

    match state.scheduler.cancel(job_id).await {
        Ok(()) => return Ok(cancelled),
        Err(SchedulerError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    // Not in the queue: decide from the durable record
    let job = state
        .jobs
        .get(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job '{}' not found", job_id)))?;

    if job.status != JobStatus::Queued {
        return Err(AppError::Conflict(format!(
            "Job '{}' is {} and cannot be cancelled",
            job_id, job.status
        )));
    }

    match state.jobs.update(job_id, &JobPatch::cancelled(Utc::now())).await? {
        Some(_) => Ok(cancelled),
        None => Err(AppError::Conflict(format!(
            "Job '{}' changed state and cannot be cancelled",
            job_id
        ))),
    }
}
