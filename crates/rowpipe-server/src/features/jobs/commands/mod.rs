//! Job commands

pub mod cancel;
pub mod create;

pub use cancel::{CancelJobCommand, CancelJobResponse};
pub use create::{CreateJobCommand, CreateJobError, CreateJobResponse};
