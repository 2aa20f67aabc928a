//! Error types for prism-eval.
//!
//! Loaders, statistics and signing return [`EvalError`]. Stage orchestration
//! wraps these in `anyhow` with file context.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for input parsing, statistics and signing.
#[derive(Error, Debug)]
pub enum EvalError {
    /// I/O errors (reading inputs, writing artifacts)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV reader errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML config parse errors
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A record could not be parsed
    #[error("Invalid record in {} at line {line}: {message}", path.display())]
    InvalidRecord {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A required CSV column is absent from the header
    #[error("Missing column '{column}' in {}", path.display())]
    MissingColumn { path: PathBuf, column: String },

    /// Nothing to compute over
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Paired sequences differ in length
    #[error("Length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    /// Stored signature does not match the recomputed digest
    #[error("Signature mismatch for {}: expected {expected}, got {actual}", path.display())]
    SignatureMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// A fixed-suite item has no recorded response
    #[error("No response recorded for: {0}")]
    MissingResponse(String),

    /// Configuration validation errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EvalError {
    /// Creates an invalid-record error.
    pub fn invalid_record(
        path: impl Into<PathBuf>,
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        EvalError::InvalidRecord {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Creates an empty-input error.
    pub fn empty(what: impl Into<String>) -> Self {
        EvalError::EmptyInput(what.into())
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        EvalError::Config(message.into())
    }
}

/// Result type alias for prism-eval operations
pub type Result<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_record_message() {
        let err = EvalError::invalid_record("preds.jsonl", 7, "missing field `score`");
        let msg = err.to_string();
        assert!(msg.contains("preds.jsonl"));
        assert!(msg.contains("line 7"));
        assert!(msg.contains("score"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EvalError = io.into();
        assert!(matches!(err, EvalError::Io(_)));
    }
}
