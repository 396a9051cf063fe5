//! Custom error types for rustlitreview.
//!
//! Run-level problems with the search API (no response, bad status, malformed
//! payload) are not errors: they end the run cleanly and are reported through
//! [`crate::runner::AbortReason`]. This enum covers the faults that do
//! propagate, mostly from the tabular store and configuration.

use thiserror::Error;

/// Main error type for rustlitreview operations.
#[derive(Debug, Error)]
pub enum LitReviewError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Transport failure that did not come from reqwest
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response or record parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Tabular store error (bad range, unknown sheet)
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using `LitReviewError`
pub type Result<T> = std::result::Result<T, LitReviewError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| LitReviewError::Parse(msg.to_string()))
    }
}
