//! Ingestion configuration
//!
//! Scheduler concurrency and worker tuning, read from the environment.

use rowpipe_common::error::{env_parse, Result, RowpipeError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of jobs processed at once.
pub const DEFAULT_WORKER_CONCURRENCY: usize = 2;

/// Default number of records per bulk insert.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default pause after a failed bulk insert, in milliseconds.
pub const DEFAULT_FAILURE_BACKOFF_MS: u64 = 1000;

/// Default header/row field separator.
pub const DEFAULT_DELIMITER: char = ',';

/// Default longest accepted line, terminator excluded (1 MiB).
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Worker tuning for a single job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub batch_size: usize,
    pub failure_backoff: Duration,
    pub delimiter: char,
    /// Longer lines are discarded and counted as failed
    pub max_line_bytes: usize,
    /// Upper bound on a single stream read; `None` waits forever
    pub read_timeout: Option<Duration>,
    /// Upper bound on a single bulk insert; `None` waits forever
    pub write_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            failure_backoff: Duration::from_millis(DEFAULT_FAILURE_BACKOFF_MS),
            delimiter: DEFAULT_DELIMITER,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl WorkerConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum jobs running at once
    pub concurrency: usize,
    pub worker: WorkerConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_WORKER_CONCURRENCY,
            worker: WorkerConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Load from `WORKER_CONCURRENCY`, `BATCH_SIZE`, `INGEST_FAILURE_BACKOFF_MS`,
    /// `INGEST_DELIMITER`, `INGEST_MAX_LINE_BYTES`, `INGEST_READ_TIMEOUT_SECS` and
    /// `INGEST_WRITE_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        let delimiter = match std::env::var("INGEST_DELIMITER") {
            Ok(raw) if !raw.is_empty() => single_char("INGEST_DELIMITER", &raw)?,
            _ => DEFAULT_DELIMITER,
        };

        let config = Self {
            concurrency: env_parse("WORKER_CONCURRENCY")?.unwrap_or(DEFAULT_WORKER_CONCURRENCY),
            worker: WorkerConfig {
                batch_size: env_parse("BATCH_SIZE")?.unwrap_or(DEFAULT_BATCH_SIZE),
                failure_backoff: Duration::from_millis(
                    env_parse("INGEST_FAILURE_BACKOFF_MS")?.unwrap_or(DEFAULT_FAILURE_BACKOFF_MS),
                ),
                delimiter,
                max_line_bytes: env_parse("INGEST_MAX_LINE_BYTES")?
                    .unwrap_or(DEFAULT_MAX_LINE_BYTES),
                read_timeout: timeout_secs(env_parse("INGEST_READ_TIMEOUT_SECS")?),
                write_timeout: timeout_secs(env_parse("INGEST_WRITE_TIMEOUT_SECS")?),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(RowpipeError::invalid_setting(
                "WORKER_CONCURRENCY",
                "0",
                "must be greater than 0",
            ));
        }

        if self.worker.batch_size == 0 {
            return Err(RowpipeError::invalid_setting(
                "BATCH_SIZE",
                "0",
                "must be greater than 0",
            ));
        }

        if self.worker.max_line_bytes == 0 {
            return Err(RowpipeError::invalid_setting(
                "INGEST_MAX_LINE_BYTES",
                "0",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

// 0 disables the timeout
fn timeout_secs(secs: Option<u64>) -> Option<Duration> {
    secs.filter(|s| *s > 0).map(Duration::from_secs)
}

fn single_char(name: &str, raw: &str) -> Result<char> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(RowpipeError::invalid_setting(
            name,
            raw,
            "must be exactly one character",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 7] = [
        "WORKER_CONCURRENCY",
        "BATCH_SIZE",
        "INGEST_FAILURE_BACKOFF_MS",
        "INGEST_DELIMITER",
        "INGEST_MAX_LINE_BYTES",
        "INGEST_READ_TIMEOUT_SECS",
        "INGEST_WRITE_TIMEOUT_SECS",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = IngestConfig::from_env().unwrap();
        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.worker.batch_size, 500);
        assert_eq!(config.worker.failure_backoff, Duration::from_millis(1000));
        assert!(config.worker.read_timeout.is_none());
        assert_eq!(config.worker.max_line_bytes, 1024 * 1024);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear();
        std::env::set_var("WORKER_CONCURRENCY", "4");
        std::env::set_var("BATCH_SIZE", "50");
        std::env::set_var("INGEST_DELIMITER", ";");
        std::env::set_var("INGEST_MAX_LINE_BYTES", "4096");
        std::env::set_var("INGEST_READ_TIMEOUT_SECS", "30");
        std::env::set_var("INGEST_WRITE_TIMEOUT_SECS", "0");

        let config = IngestConfig::from_env().unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.worker.batch_size, 50);
        assert_eq!(config.worker.delimiter, ';');
        assert_eq!(config.worker.max_line_bytes, 4096);
        assert_eq!(config.worker.read_timeout, Some(Duration::from_secs(30)));
        assert!(config.worker.write_timeout.is_none());

        clear();
    }

    #[test]
    #[serial]
    fn test_invalid_values_name_the_variable() {
        clear();
        std::env::set_var("BATCH_SIZE", "0");
        let err = IngestConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("BATCH_SIZE"));

        clear();
        std::env::set_var("WORKER_CONCURRENCY", "many");
        let err = IngestConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("WORKER_CONCURRENCY"));

        clear();
        std::env::set_var("INGEST_DELIMITER", "::");
        let err = IngestConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("INGEST_DELIMITER"));

        clear();
        std::env::set_var("INGEST_MAX_LINE_BYTES", "0");
        let err = IngestConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("INGEST_MAX_LINE_BYTES"));

        clear();
    }
}
