//! Rowpipe Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging setup for the rowpipe workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`RowpipeError`] and the [`Result`] alias used for configuration
//!   and other cross-crate failures
//! - **Logging**: structured `tracing` setup driven by [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use rowpipe_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("rowpipe started");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, RowpipeError};
