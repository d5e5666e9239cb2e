//! Retry executor for gateway calls
//!
//! Every call against the payment gateway goes through [`RetryExecutor`]. A
//! failed call is classified with [`classify_error`]; retryable failures are
//! attempted again after a delay chosen by a [`BackoffPolicy`], up to
//! `max_retries` total attempts. Only the final failure reaches the caller.
//!
//! The attempt counter is local to each `execute_with_retry` call, so one
//! executor can be shared freely between tasks.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::error::{classify_error, GatewayError, PaymentError};

/// Chooses the wait before the next attempt.
///
/// Implementations must be non-decreasing in `retry`.
pub trait BackoffPolicy: Send + Sync + fmt::Debug {
    /// Delay before retry number `retry` (1 for the first retry)
    fn delay(&self, retry: u32) -> Duration;
}

/// Exponential backoff, doubling from `base` and capped at `max`.
///
/// With jitter enabled a random extra of up to half the un-jittered delay is
/// added. Since the next step doubles, the sequence stays non-decreasing.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: true,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_secs(5))
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, retry: u32) -> Duration {
        let base_ms = self.base.as_millis().min(u64::MAX as u128) as u64;
        let cap_ms = self.max.as_millis().min(u64::MAX as u128) as u64;
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let raw = base_ms.saturating_mul(factor);

        let jitter = if self.jitter && raw > 1 {
            let mut rng = SmallRng::from_entropy();
            rng.gen_range(0..=raw / 2)
        } else {
            0
        };

        Duration::from_millis(raw.saturating_add(jitter).min(cap_ms))
    }
}

/// The same delay before every retry
#[derive(Debug, Clone)]
pub struct FixedBackoff(pub Duration);

impl BackoffPolicy for FixedBackoff {
    fn delay(&self, _retry: u32) -> Duration {
        self.0
    }
}

/// Retry immediately
#[derive(Debug, Clone, Default)]
pub struct NoBackoff;

impl BackoffPolicy for NoBackoff {
    fn delay(&self, _retry: u32) -> Duration {
        Duration::ZERO
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Total attempts allowed, including the first
    pub max_retries: u32,
    /// Time budget for a single attempt; exceeding it is a connection error
    pub per_call_timeout: Option<Duration>,
    pub backoff: Arc<dyn BackoffPolicy>,
}

impl RetryOptions {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
            ..Default::default()
        }
    }

    pub fn with_backoff(mut self, backoff: impl BackoffPolicy + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_call_timeout = Some(timeout);
        self
    }

    /// No waiting between attempts and no per-call timeout
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
            per_call_timeout: None,
            backoff: Arc::new(NoBackoff),
        }
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            per_call_timeout: Some(Duration::from_secs(30)),
            backoff: Arc::new(ExponentialBackoff::default()),
        }
    }
}

/// Result of a retried operation
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    /// Number of times the operation was invoked (at least 1)
    pub attempts: u32,
    pub result: Result<T, PaymentError>,
}

impl<T> RetryOutcome<T> {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&PaymentError> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<T, PaymentError> {
        self.result
    }
}

/// Runs gateway operations with classification and bounded retries
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    options: RetryOptions,
}

impl RetryExecutor {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Invokes `operation` until it succeeds, fails with a non-retryable
    /// error, or `max_retries` attempts have been made.
    pub async fn execute_with_retry<T, F, Fut>(&self, name: &str, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let max_attempts = self.options.max_retries.max(1);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let result = match self.options.per_call_timeout {
                Some(limit) => match tokio::time::timeout(limit, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(GatewayError::Timeout {
                        operation: name.to_string(),
                        after_ms: limit.as_millis().min(u64::MAX as u128) as u64,
                    }),
                },
                None => operation().await,
            };

            let raw = match result {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(operation = name, attempts, "gateway call succeeded after retry");
                    }
                    return RetryOutcome { attempts, result: Ok(value) };
                }
                Err(raw) => raw,
            };

            let error = classify_error(&raw);
            if !error.retryable || attempts >= max_attempts {
                warn!(
                    operation = name,
                    attempts,
                    error_type = %error.error_type,
                    code = %error.code,
                    retryable = error.retryable,
                    "gateway call failed"
                );
                return RetryOutcome { attempts, result: Err(error) };
            }

            let delay = self.options.backoff.delay(attempts);
            warn!(
                operation = name,
                attempt = attempts,
                max_attempts,
                error_type = %error.error_type,
                next_delay_ms = delay.as_millis() as u64,
                "retrying transient gateway error"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor(max: u32) -> RetryExecutor {
        RetryExecutor::new(RetryOptions::immediate(max))
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let outcome = executor(3)
            .execute_with_retry("op", || async { Ok::<_, GatewayError>(42) })
            .await;
        assert!(outcome.success());
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = executor(5)
            .execute_with_retry("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GatewayError::card("stolen_card")) }
            })
            .await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!outcome.error().unwrap().retryable);
    }

    #[tokio::test]
    async fn test_persistent_transient_failure_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = executor(4)
            .execute_with_retry("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GatewayError::rate_limit()) }
            })
            .await;
        assert_eq!(outcome.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_connection_error() {
        let options = RetryOptions::immediate(2).with_timeout(Duration::from_millis(10));
        let outcome: RetryOutcome<()> = RetryExecutor::new(options)
            .execute_with_retry("slow", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.error().unwrap().code, "timeout");
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_millis(1000))
            .without_jitter();
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
        assert_eq!(backoff.delay(5), Duration::from_millis(1000));
        assert_eq!(backoff.delay(64), Duration::from_millis(1000));
    }
}
