//! List jobs query
//!
//! Jobs filtered by status, oldest first.

use serde::{Deserialize, Serialize};

use crate::error::{ApiResult, AppError};
use crate::ingest::{Job, JobStatus, JobStore};

pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_LIMIT: i64 = 1000;

const ALL_STATUSES: [JobStatus; 5] = [
    JobStatus::Queued,
    JobStatus::Running,
    JobStatus::Succeeded,
    JobStatus::Failed,
    JobStatus::Cancelled,
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListJobsQuery {
    /// Comma-separated statuses, e.g. `queued,running`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

impl ListJobsQuery {
    pub fn statuses(&self) -> ApiResult<Vec<JobStatus>> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(ALL_STATUSES.to_vec()),
            Some(raw) => raw
                .split(',')
                .map(|s| {
                    s.trim()
                        .parse::<JobStatus>()
                        .map_err(|e| AppError::BadRequest(e.to_string()))
                })
                .collect(),
        }
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}

pub async fn handle(jobs: &dyn JobStore, query: ListJobsQuery) -> ApiResult<Vec<Job>> {
    let statuses = query.statuses()?;
    Ok(jobs.find_by_status(&statuses, Some(query.limit())).await?)
}
