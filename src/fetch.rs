//! HTTP GET with bounded retries and exponential backoff.
//!
//! Delay before retrying after attempt `n` (1-based) is
//! `backoff_factor * 2^(n-1)` seconds, rounded to whole milliseconds.
//! Transport errors and transient statuses (429, 5xx) are retried; any other
//! status is handed back to the caller untouched.

use crate::config::RunConfig;
use crate::error::Result;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fallback factor when the configured one is not a finite number
const DEFAULT_BACKOFF_FACTOR: f64 = 1.0;

/// Smallest accepted backoff factor, in seconds
const MIN_BACKOFF_FACTOR: f64 = 0.1;

/// A fully read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 429 or any 5xx
    pub fn is_transient(&self) -> bool {
        self.status == 429 || (500..600).contains(&self.status)
    }
}

/// Something that can perform a single HTTP GET.
///
/// An `Err` means the request never produced a status (connection refused,
/// timeout, TLS failure); HTTP error statuses come back as `Ok`.
pub trait Transport {
    fn get(&self, url: &str) -> impl Future<Output = Result<HttpResponse>> + Send;
}

/// reqwest-backed transport sending `Accept: application/json`.
pub struct HttpTransport {
    client: Client,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(timeout: Duration, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("rustlitreview/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self { client, api_key })
    }

    pub fn from_config(config: &RunConfig) -> Result<Self> {
        Self::new(config.request_timeout, config.api_key.clone())
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse { status, body })
    }
}

/// Attempt count after coercion: never below 1.
pub fn effective_attempts(retry_count: u32) -> u32 {
    retry_count.max(1)
}

/// Backoff factor after coercion: at least 0.1s, non-finite values become 1.0.
pub fn effective_backoff_factor(factor: f64) -> f64 {
    if factor.is_finite() {
        factor.max(MIN_BACKOFF_FACTOR)
    } else {
        DEFAULT_BACKOFF_FACTOR
    }
}

/// Delay after a failed `attempt` (1-based).
pub fn backoff_delay(factor: f64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let millis = (factor * 2f64.powi(exponent) * 1000.0).round();
    Duration::from_millis(millis as u64)
}

/// GET `url` with up to `retry_count` attempts.
///
/// Returns `None` only when the last attempt failed at the transport level.
/// Otherwise returns the first 2xx response, the first non-transient error
/// response, or whatever the last attempt produced.
pub async fn fetch_with_backoff<T: Transport>(
    transport: &T,
    url: &str,
    retry_count: u32,
    backoff_factor: f64,
) -> Option<HttpResponse> {
    let attempts = effective_attempts(retry_count);
    let factor = effective_backoff_factor(backoff_factor);

    debug!(attempts, factor, "Fetching with backoff");

    for attempt in 1..=attempts {
        match transport.get(url).await {
            Ok(response) => {
                info!(attempt, attempts, status = response.status, "Attempt finished");
                if response.is_success() {
                    return Some(response);
                }

                if attempt < attempts && response.is_transient() {
                    let delay = backoff_delay(factor, attempt);
                    warn!(
                        status = response.status,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after transient HTTP status"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }

                return Some(response);
            }
            Err(e) => {
                warn!(attempt, attempts, error = %e, "Attempt failed");
                if attempt < attempts {
                    let delay = backoff_delay(factor, attempt);
                    warn!(delay_ms = delay.as_millis() as u64, "Retrying after transport error");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return None;
            }
        }
    }

    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::LitReviewError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// One scripted reply of [`ScriptedTransport`].
    #[derive(Debug, Clone)]
    pub(crate) enum Reply {
        Status(u16, &'static str),
        Fail,
    }

    /// Transport replaying a fixed script; the last reply repeats.
    pub(crate) struct ScriptedTransport {
        replies: Mutex<VecDeque<Reply>>,
        calls: AtomicUsize,
        urls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn urls(&self) -> Vec<String> {
            self.urls.lock().map(|u| u.clone()).unwrap_or_default()
        }

        fn next_reply(&self) -> Reply {
            let mut replies = self.replies.lock().expect("script lock");
            if replies.len() > 1 {
                replies.pop_front().expect("non-empty script")
            } else {
                replies.front().cloned().unwrap_or(Reply::Fail)
            }
        }
    }

    impl Transport for ScriptedTransport {
        async fn get(&self, url: &str) -> Result<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut urls) = self.urls.lock() {
                urls.push(url.to_string());
            }
            match self.next_reply() {
                Reply::Status(status, body) => Ok(HttpResponse::new(status, body)),
                Reply::Fail => Err(LitReviewError::Transport("connection reset".to_string())),
            }
        }
    }

    #[test]
    fn test_backoff_delay_doubles() {
        assert_eq!(backoff_delay(1.0, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1.0, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(1.0, 3), Duration::from_millis(4000));
        assert_eq!(backoff_delay(0.25, 4), Duration::from_millis(2000));
    }

    #[test]
    fn test_coercion() {
        assert_eq!(effective_attempts(0), 1);
        assert_eq!(effective_attempts(3), 3);
        assert_eq!(effective_backoff_factor(0.0), 0.1);
        assert_eq!(effective_backoff_factor(-5.0), 0.1);
        assert_eq!(effective_backoff_factor(f64::NAN), 1.0);
        assert_eq!(effective_backoff_factor(2.5), 2.5);
    }

    #[test]
    fn test_status_classes() {
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(300, "").is_success());
        assert!(HttpResponse::new(429, "").is_transient());
        assert!(HttpResponse::new(503, "").is_transient());
        assert!(!HttpResponse::new(404, "").is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failing_transport_returns_none() {
        for attempts in 1..=4 {
            let transport = ScriptedTransport::new(vec![Reply::Fail]);
            let result =
                fetch_with_backoff(&transport, "http://api.test/search", attempts, 0.1).await;
            assert!(result.is_none());
            assert_eq!(transport.calls(), attempts as usize);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_calls_once() {
        let transport = ScriptedTransport::new(vec![Reply::Fail]);
        assert!(fetch_with_backoff(&transport, "http://api.test", 0, 1.0).await.is_none());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_third_attempt_waits_between_attempts() {
        let transport = ScriptedTransport::new(vec![
            Reply::Fail,
            Reply::Status(503, "busy"),
            Reply::Status(200, "{}"),
        ]);

        let start = tokio::time::Instant::now();
        let response = fetch_with_backoff(&transport, "http://api.test", 5, 0.5).await;
        let elapsed = start.elapsed();

        assert_eq!(response, Some(HttpResponse::new(200, "{}")));
        assert_eq!(transport.calls(), 3);
        // 0.5s after attempt 1, 1.0s after attempt 2
        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_status_is_not_retried() {
        let transport = ScriptedTransport::new(vec![
            Reply::Status(404, "missing"),
            Reply::Status(200, "{}"),
        ]);
        let response = fetch_with_backoff(&transport, "http://api.test", 5, 1.0).await;
        assert_eq!(response, Some(HttpResponse::new(404, "missing")));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_status_returned_after_last_attempt() {
        let transport = ScriptedTransport::new(vec![Reply::Status(429, "slow down")]);
        let response = fetch_with_backoff(&transport, "http://api.test", 3, 0.1).await;
        assert_eq!(response, Some(HttpResponse::new(429, "slow down")));
        assert_eq!(transport.calls(), 3);
    }
}
