//! Retry executor for upstream fetches.
//!
//! # Responsibilities
//! - Run one logical upstream call up to `1 + max_retries` times
//! - Enforce a per-attempt timeout that cancels the in-flight call
//! - Classify failures as retryable or terminal
//! - Sleep with jittered exponential backoff between attempts
//!
//! # Design Decisions
//! - Timeouts and network errors are always retryable
//! - HTTP 5xx and 429 are retryable; other 4xx are terminal
//! - Malformed bodies are terminal (retrying will not fix them)
//! - The executor reports the attempt count it consumed

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::resilience::backoff::calculate_backoff;

/// A failed upstream attempt, classified for retry purposes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("attempt timed out after {0} ms")]
    Timeout(u64),

    #[error("upstream returned HTTP {status}")]
    Http { status: u16, body: String },

    #[error("malformed response body: {0}")]
    Parse(String),

    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout(_) => true,
            FetchError::Http { status, .. } => *status >= 500 || *status == 429,
            FetchError::Parse(_) | FetchError::TooLarge { .. } => false,
        }
    }
}

/// Backoff-governed attempt loop around a single upstream call.
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `attempt` until it succeeds, fails terminally, or the retry
    /// budget is exhausted. Returns the final result and the number of
    /// attempts consumed.
    ///
    /// Each attempt races against `attempt_timeout`; losing the race drops
    /// (cancels) the in-flight call and counts as a timeout failure.
    pub async fn run<T, F, Fut>(
        &self,
        max_retries: u32,
        attempt_timeout: Duration,
        mut attempt: F,
    ) -> (Result<T, FetchError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = max_retries.saturating_add(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let result = match tokio::time::timeout(attempt_timeout, attempt()).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(attempt_timeout.as_millis() as u64)),
            };

            match result {
                Ok(value) => return (Ok(value), attempts),
                Err(error) if error.is_retryable() && attempts < max_attempts => {
                    let delay = calculate_backoff(
                        attempts,
                        self.config.base_delay_ms,
                        self.config.max_delay_ms,
                    );
                    tracing::info!(
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying upstream call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return (Err(error), attempts),
            }
        }
    }
}
