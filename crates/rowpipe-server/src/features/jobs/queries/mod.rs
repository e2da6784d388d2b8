//! Job queries

pub mod get_job;
pub mod list_jobs;

pub use get_job::GetJobQuery;
pub use list_jobs::ListJobsQuery;
