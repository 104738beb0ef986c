//! Error types for fitscout.
//!
//! Library crates use [`FitScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all fitscout operations.
#[derive(Debug, thiserror::Error)]
pub enum FitScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to the lookup source.
    #[error("network error: {0}")]
    Network(String),

    /// The page fetcher could not be opened or became unusable mid-run.
    #[error("fetcher error: {0}")]
    Fetcher(String),

    /// Catalog or page content could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// JSON (de)serialization of a persisted payload failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A requested record range does not fit the loaded catalog.
    #[error("invalid range [{start}, {end}) for {total} automotive parts")]
    InvalidRange { start: usize, end: usize, total: usize },

    /// Start was requested before any catalog was loaded.
    #[error("no catalog loaded")]
    NoDataLoaded,

    /// A session is already running (or still winding down after a stop).
    #[error("a session is already running")]
    AlreadyRunning,

    /// No checkpoint exists for the requested session.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The requested session has already processed its whole range.
    #[error("session {0} is already completed")]
    AlreadyCompleted(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FitScoutError>;

impl FitScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error was caused by bad caller input rather than a failure.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange { .. }
                | Self::NoDataLoaded
                | Self::AlreadyRunning
                | Self::SessionNotFound(_)
                | Self::AlreadyCompleted(_)
        )
    }
}

impl From<serde_json::Error> for FitScoutError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = FitScoutError::config("missing home directory");
        assert_eq!(err.to_string(), "config error: missing home directory");

        let err = FitScoutError::InvalidRange {
            start: 10,
            end: 5,
            total: 200,
        };
        assert_eq!(
            err.to_string(),
            "invalid range [10, 5) for 200 automotive parts"
        );
    }

    #[test]
    fn input_errors_are_classified() {
        assert!(FitScoutError::NoDataLoaded.is_input_error());
        assert!(FitScoutError::AlreadyCompleted("x".into()).is_input_error());
        assert!(!FitScoutError::Storage("disk full".into()).is_input_error());
        assert!(!FitScoutError::Fetcher("closed".into()).is_input_error());
    }
}
