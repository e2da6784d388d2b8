//! Jobs feature module
//!
//! Submitting uploaded files for ingestion, job status and cancellation, and a view of
//! the in-process scheduler.

pub mod commands;
pub mod queries;
pub mod routes;

pub use routes::{jobs_routes, scheduler_routes};
