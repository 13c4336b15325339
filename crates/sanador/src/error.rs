//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Input file could not be used
    #[error("Cannot read {path}: {message}")]
    Input {
        /// Offending file
        path: String,
        /// Error message
        message: String,
    },

    /// Nothing matched
    #[error("No match: {message}")]
    NoMatch {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Sanar library error
    #[error("Sanar error: {0}")]
    Sanar(#[from] sanar::HealError),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a no-match error
    #[must_use]
    pub fn no_match(message: impl Into<String>) -> Self {
        Self::NoMatch {
            message: message.into(),
        }
    }

    /// Create an input error for `path`
    #[must_use]
    pub fn input(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Self::Input {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}
