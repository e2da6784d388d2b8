//! Job routes

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use crate::api::response::ApiResponse;
use crate::error::ApiResult;
use crate::features::{parse_id, FeatureState};

use super::commands::{cancel, CancelJobCommand};
use super::queries::{get_job, list_jobs, GetJobQuery, ListJobsQuery};

pub fn jobs_routes() -> Router<FeatureState> {
    Router::new()
        .route("/", get(list_jobs_handler))
        .route("/:job_id", get(get_job_handler))
        .route("/:job_id/cancel", post(cancel_job_handler))
}

pub fn scheduler_routes() -> Router<FeatureState> {
    Router::new().route("/", get(scheduler_stats_handler))
}

/// GET /jobs?status=queued,running&limit=50
async fn list_jobs_handler(
    State(state): State<FeatureState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Response> {
    let jobs = list_jobs::handle(state.jobs.as_ref(), query).await?;
    let count = jobs.len();
    Ok(ApiResponse::success_with_meta(jobs, json!({ "count": count })).into_response())
}

/// GET /jobs/:job_id
async fn get_job_handler(
    State(state): State<FeatureState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let query = GetJobQuery {
        job_id: parse_id(&job_id, "job")?,
    };
    let job = get_job::handle(state.jobs.as_ref(), query).await?;
    Ok(ApiResponse::success(job).into_response())
}

/// POST /jobs/:job_id/cancel
async fn cancel_job_handler(
    State(state): State<FeatureState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let command = CancelJobCommand {
        job_id: parse_id(&job_id, "job")?,
    };
    let response = cancel::handle(&state, command).await?;
    Ok(ApiResponse::success(response).into_response())
}

/// GET /scheduler
async fn scheduler_stats_handler(State(state): State<FeatureState>) -> Response {
    ApiResponse::success(state.scheduler.stats()).into_response()
}
