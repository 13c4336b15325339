//! Result and error types for Sanar.

use thiserror::Error;

/// Result type for Sanar operations
pub type HealResult<T> = Result<T, HealError>;

/// Errors that can occur inside the healing engine.
///
/// These never cross the identification/healing API: those entry points
/// degrade to `None` or `success: false`. Setup-time operations (config
/// parsing, snapshot import) return them directly.
#[derive(Debug, Error)]
pub enum HealError {
    /// Page access failed
    #[error("Page error: {message}")]
    Page {
        /// Error message
        message: String,
    },

    /// In-page evaluation failed or returned unusable data
    #[error("Evaluation failed: {message}")]
    Evaluation {
        /// Error message
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Selector could not be parsed
    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector {
        /// Offending selector
        selector: String,
        /// Error message
        message: String,
    },

    /// DOM snapshot is malformed
    #[error("Invalid DOM snapshot: {message}")]
    Snapshot {
        /// Error message
        message: String,
    },

    /// Feature extraction failed for an element
    #[error("Feature extraction failed: {message}")]
    Extraction {
        /// Error message
        message: String,
    },

    /// Configuration value rejected
    #[error("Invalid configuration for {key}: {message}")]
    Config {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// Snapshot produced by an incompatible version
    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedSnapshotVersion {
        /// Version found in the snapshot
        found: u32,
        /// Version this build understands
        expected: u32,
    },

    /// Diagnostics collection failed
    #[error("Diagnostics unavailable: {message}")]
    Diagnostics {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl HealError {
    /// Create a page error
    #[must_use]
    pub fn page(message: impl Into<String>) -> Self {
        Self::Page {
            message: message.into(),
        }
    }

    /// Create an evaluation error
    #[must_use]
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a selector error
    #[must_use]
    pub fn invalid_selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HealError::Timeout { ms: 2000 };
        assert_eq!(err.to_string(), "Operation timed out after 2000ms");

        let err = HealError::config("AI_ENABLED", "expected a boolean");
        assert!(err.to_string().contains("AI_ENABLED"));
    }

    #[test]
    fn test_json_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: HealError = parse.unwrap_err().into();
        assert!(matches!(err, HealError::Json(_)));
    }
}
