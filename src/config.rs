//! Run configuration.
//!
//! Defaults mirror the values the feed was first deployed with: an
//! open-access "LLM Safety" search over the last ten months, fifteen rows
//! per run, five fetch attempts with a one second backoff factor.

use crate::error::{LitReviewError, Result};
use std::time::Duration;
use url::Url;

/// Semantic Scholar bulk search endpoint
pub const DEFAULT_API_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search/bulk";

/// Options for a single feed run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Target sheet name (created when absent)
    pub sheet_name: String,
    /// Search query term
    pub search_keyword: String,
    /// Restrict results to papers with an open access PDF
    pub open_access_only: bool,
    /// Maximum rows appended in one run (also the API `limit`)
    pub limit_per_run: usize,
    /// Publication window, in months back from the current month
    pub published_past_months: u32,
    /// Maximum fetch attempts, including the first
    pub retry_count: u32,
    /// Base delay in seconds; delay = factor * 2^(attempt-1)
    pub backoff_factor_seconds: f64,
    /// Search endpoint
    pub api_url: String,
    /// Optional API key sent as `x-api-key`
    pub api_key: Option<String>,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            sheet_name: "Sheet1".to_string(),
            search_keyword: "LLM Safety".to_string(),
            open_access_only: true,
            limit_per_run: 15,
            published_past_months: 10,
            retry_count: 5,
            backoff_factor_seconds: 1.0,
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RunConfig {
    /// Check the options that would otherwise fail late in the run.
    ///
    /// Retry count and backoff factor are not checked here: the fetcher
    /// coerces them into range.
    pub fn validate(&self) -> Result<()> {
        if self.search_keyword.trim().is_empty() {
            return Err(LitReviewError::Config("search keyword is empty".to_string()));
        }
        if self.sheet_name.trim().is_empty() {
            return Err(LitReviewError::Config("sheet name is empty".to_string()));
        }
        if self.sheet_name.contains(['/', '\\']) {
            return Err(LitReviewError::Config(format!(
                "sheet name must not contain path separators: {}",
                self.sheet_name
            )));
        }
        if self.limit_per_run == 0 {
            return Err(LitReviewError::Config("limit per run must be at least 1".to_string()));
        }
        Url::parse(&self.api_url).map_err(|e| {
            LitReviewError::Config(format!("invalid API URL {}: {}", self.api_url, e))
        })?;
        Ok(())
    }
}
