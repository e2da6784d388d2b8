//! Get job query

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiResult, AppError};
use crate::ingest::{Job, JobStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobQuery {
    pub job_id: Uuid,
}

pub async fn handle(jobs: &dyn JobStore, query: GetJobQuery) -> ApiResult<Job> {
    jobs.get(query.job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job '{}' not found", query.job_id)))
}
