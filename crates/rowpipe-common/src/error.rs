//! Error types shared across rowpipe crates

use thiserror::Error;

/// Result type alias for rowpipe operations
pub type Result<T> = std::result::Result<T, RowpipeError>;

/// Main error type for rowpipe
#[derive(Error, Debug)]
pub enum RowpipeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidSetting {
        name: String,
        value: String,
        reason: String,
    },
}

impl RowpipeError {
    /// Build an error for an environment setting that failed to parse or validate
    pub fn invalid_setting(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSetting {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Read an optional environment variable and parse it.
///
/// Unset or empty variables yield `Ok(None)`; a present but unparsable value is an error
/// naming the variable.
pub fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| RowpipeError::invalid_setting(name, raw.clone(), e.to_string())),
        Err(_) => Ok(None),
    }
}
