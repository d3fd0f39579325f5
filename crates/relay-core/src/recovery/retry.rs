//! Retry executor for a single provider call
//!
//! Knows nothing about circuits, model selection or statistics: it runs one
//! operation, classifies each failure and retries only server errors and
//! timeouts with exponential backoff.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::backoff::ExponentialBackoff;
use super::classifier::{ProviderError, classify_error};
use crate::provider::{RawProviderError, sanitize_error_text};

/// Retry parameters
///
/// # Example
/// ```
/// use relay_core::recovery::RetryConfig;
/// use std::time::Duration;
///
/// let config = RetryConfig::default()
///     .with_max_retries(1)
///     .with_jitter(Duration::ZERO);
/// assert_eq!(config.max_retries, 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; total calls are `max_retries + 1`
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Upper bound of the uniform jitter added to each delay
    #[serde(with = "humantime_serde")]
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// No retries, no delay
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }
}

/// Outcome of [`RetryPolicy::execute`]
#[derive(Debug)]
pub enum RetryResult<T> {
    /// Operation succeeded after `attempts` calls
    Success { value: T, attempts: u32 },
    /// Non-retryable error, or retries exhausted
    Failed { error: ProviderError, attempts: u32 },
    /// Cancelled before or between attempts
    Cancelled {
        last_error: Option<ProviderError>,
        attempts: u32,
    },
}

impl<T> RetryResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryResult::Success { attempts, .. }
            | RetryResult::Failed { attempts, .. }
            | RetryResult::Cancelled { attempts, .. } => *attempts,
        }
    }
}

/// Stateless retry executor; cheap to clone and share
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    backoff: ExponentialBackoff,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        let backoff = ExponentialBackoff::new(config.base_delay, config.max_delay, config.jitter);
        Self { config, backoff }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of retries.
    ///
    /// The backoff sleep races against `cancel`; a cancelled token never starts
    /// another attempt.
    pub async fn execute<T, F, Fut>(
        &self,
        provider: &str,
        model: &str,
        mut operation: F,
        cancel: Option<&CancellationToken>,
    ) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RawProviderError>>,
    {
        let mut attempt: u32 = 0;
        let mut last_error: Option<ProviderError> = None;

        loop {
            if cancel.is_some_and(|token| token.is_cancelled()) {
                return RetryResult::Cancelled {
                    last_error,
                    attempts: attempt,
                };
            }

            let raw = match operation().await {
                Ok(value) => {
                    return RetryResult::Success {
                        value,
                        attempts: attempt + 1,
                    };
                }
                Err(raw) => raw,
            };

            let error = classify_error(raw);
            attempt += 1;

            if !error.is_retryable() {
                tracing::warn!(
                    provider = %provider,
                    model = %model,
                    error_type = %error.kind(),
                    error = %sanitize_error_text(error.message()),
                    "non_retryable_error"
                );
                return RetryResult::Failed {
                    error,
                    attempts: attempt,
                };
            }

            if attempt > self.config.max_retries {
                tracing::error!(
                    provider = %provider,
                    model = %model,
                    attempts = attempt,
                    error_type = %error.kind(),
                    error = %sanitize_error_text(error.message()),
                    "all_retries_exhausted"
                );
                return RetryResult::Failed {
                    error,
                    attempts: attempt,
                };
            }

            let delay = self.backoff.delay_for_attempt(attempt - 1);
            tracing::warn!(
                provider = %provider,
                model = %model,
                attempt = attempt,
                max_retries = self.config.max_retries,
                error_type = %error.kind(),
                next_delay_seconds = delay.as_secs_f64(),
                "retry_attempt"
            );
            last_error = Some(error);

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return RetryResult::Cancelled {
                                last_error,
                                attempts: attempt,
                            };
                        }
                        _ = sleep(delay) => {}
                    }
                }
                None => sleep(delay).await,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::classifier::ErrorKind;
    use reqwest::header::HeaderMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy::new(RetryConfig::default().with_jitter(Duration::ZERO))
    }

    fn server_error() -> RawProviderError {
        RawProviderError::status(503, HeaderMap::new(), "unavailable")
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let result = no_jitter()
            .execute("Groq", "llama", || async { Ok::<_, RawProviderError>("ok") }, None)
            .await;
        assert!(matches!(result, RetryResult::Success { value: "ok", attempts: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let counter = calls.clone();
        let result: RetryResult<()> = no_jitter()
            .execute(
                "Groq",
                "llama",
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(RawProviderError::status(429, HeaderMap::new(), "slow down")) }
                },
                None,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        match result {
            RetryResult::Failed { error, attempts } => {
                assert_eq!(error.kind(), ErrorKind::RateLimit);
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_exhausts_after_max_retries_plus_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let counter = calls.clone();
        let result: RetryResult<()> = no_jitter()
            .execute(
                "Groq",
                "llama",
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(server_error()) }
                },
                None,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 2s + 4s + 8s
        assert_eq!(start.elapsed(), Duration::from_secs(14));
        match result {
            RetryResult::Failed { error, attempts } => {
                assert_eq!(error.kind(), ErrorKind::Server);
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_timeout() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = no_jitter()
            .execute(
                "Cerebras",
                "llama",
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(RawProviderError::Timeout("read timed out".into()))
                        } else {
                            Ok(n)
                        }
                    }
                },
                None,
            )
            .await;
        assert!(matches!(result, RetryResult::Success { value: 1, attempts: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_jittered_delays_stay_in_range() {
        let policy = RetryPolicy::new(RetryConfig::default().with_max_retries(2));
        let start = Instant::now();
        let _: RetryResult<()> = policy
            .execute("p", "m", || async { Err(server_error()) }, None)
            .await;
        let elapsed = start.elapsed();
        // (2 + [0,1)) + (4 + [0,1))
        assert!(elapsed >= Duration::from_secs(6));
        assert!(elapsed < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = no_jitter();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let result: RetryResult<()> = policy
            .execute(
                "p",
                "m",
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(server_error()) }
                },
                Some(&token),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result {
            RetryResult::Cancelled { last_error, attempts } => {
                assert_eq!(attempts, 1);
                assert_eq!(last_error.map(|e| e.kind()), Some(ErrorKind::Server));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_already_cancelled_never_calls() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: RetryResult<()> = no_jitter()
            .execute(
                "p",
                "m",
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(server_error()) }
                },
                Some(&token),
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(result, RetryResult::Cancelled { last_error: None, attempts: 0 }));
    }
}
