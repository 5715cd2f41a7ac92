//! Common error types for the analysis pipeline
//!
//! # Design Principles (KISS)
//! - One error enum covering the failure modes of a single `run()`
//! - Parameter problems are rejected before any file I/O happens
//! - Use thiserror for ergonomic error handling

use thiserror::Error;

/// Errors surfaced by the analysis pipeline
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Acquisition file or required md5 sibling absent
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// No pulse headers matched, or every pulse was rejected by the window filter
    #[error("Malformed stream: {reason} (headers: {n_headers}, retained: {n_retained})")]
    MalformedStream {
        reason: String,
        n_headers: usize,
        n_retained: usize,
    },

    /// Configuration parameter outside its valid range
    #[error("Parameter out of range: {0}")]
    ParameterRange(String),

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (product writer)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    /// Create a missing-input error
    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    /// Create a parameter-range error
    pub fn parameter(msg: impl Into<String>) -> Self {
        Self::ParameterRange(msg.into())
    }

    /// Create a malformed-stream error
    pub fn malformed(reason: impl Into<String>, n_headers: usize, n_retained: usize) -> Self {
        Self::MalformedStream {
            reason: reason.into(),
            n_headers,
            n_retained,
        }
    }
}

/// Result type alias using AnalysisError
pub type AnalysisResult<T> = Result<T, AnalysisError>;
