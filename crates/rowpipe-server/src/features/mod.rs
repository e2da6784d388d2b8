//! Feature modules implementing the rowpipe API
//!
//! Each feature is a vertical slice:
//! - `commands/` - write operations (upload, create, cancel)
//! - `queries/` - read operations (get, list)
//! - `routes.rs` - HTTP route definitions
//!
//! # Features
//!
//! - **files**: upload files into blob storage and look them up
//! - **jobs**: submit files for ingestion, query and cancel jobs, scheduler stats

pub mod files;
pub mod jobs;

use axum::Router;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::ingest::{BlobStore, FileStore, JobScheduler, JobStore};

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub jobs: Arc<dyn JobStore>,
    pub files: Arc<dyn FileStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub scheduler: JobScheduler,
}

/// Creates the API router with all feature routes mounted:
/// - `/files` - upload, lookup and submission for processing
/// - `/jobs` - job status, listing and cancellation
/// - `/scheduler` - queue statistics
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .nest("/files", files::files_routes())
        .nest("/jobs", jobs::jobs_routes())
        .nest("/scheduler", jobs::scheduler_routes())
        .with_state(state)
}

/// Parse a path identifier, answering 400 in the standard envelope when malformed
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("Invalid {} id: {}", what, raw)))
}
