/// Error types for strscout.
///
/// Only configuration problems are surfaced as errors. Everything that goes wrong
/// while walking or scanning (unreadable directories, vanished files, binary
/// content) is tallied in the run summary instead, see [`crate::results::SkipReason`]
/// and [`crate::search::walker::WalkWarning`].
///
/// ```rust,ignore
/// match strscout::search(&config) {
///     Ok(outcome) => // render outcome.report and outcome.summary,
///     Err(SearchError::ConfigError { field, reason }) => // report the bad field,
///     Err(e) => // other failures
/// }
/// ```
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors that can occur before or while setting up a search
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid {field}: {reason}")]
    ConfigError { field: &'static str, reason: String },
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Failed to load configuration: {0}")]
    ConfigFile(#[from] ::config::ConfigError),
    #[error("Worker pool error: {0}")]
    Pool(String),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SearchError {
    pub fn config_error(field: &'static str, reason: impl Into<String>) -> Self {
        Self::ConfigError {
            field,
            reason: reason.into(),
        }
    }

    pub fn invalid_pattern(pattern: impl Into<String>) -> Self {
        Self::InvalidPattern(pattern.into())
    }

    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }

    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Maps an I/O error on `path` to the most specific variant.
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::file_not_found(path),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::IoError(err),
        }
    }

    /// Whether this error was raised by configuration validation
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigError { .. } | Self::InvalidPattern(_) | Self::ConfigFile(_)
        )
    }
}
