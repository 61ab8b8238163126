//! Exponential backoff with jitter.
//!
//! Category-aware backoff with jitter and max-delay clamping, driven by a
//! single `shouldRetry`/`onRetry` callback shape so a caller can plug in
//! whatever error classification it needs.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
    /// Fraction of the raw delay added as random jitter, in `[0, 1]`.
    pub jitter_ratio: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 10_000,
            factor: 2.0,
            jitter_ratio: 0.2,
        }
    }
}

impl BackoffConfig {
    /// Delay before attempt `n` (1-indexed retry attempt):
    /// `min(maxDelayMs, baseDelayMs * factor^(n-1)) + jitterRatio * random * raw`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let raw = self.base_delay_ms as f64 * self.factor.powi(attempt.saturating_sub(1) as i32);
        let capped = raw.min(self.max_delay_ms as f64);
        let jitter = rand::thread_rng().gen_range(0.0..=1.0) * self.jitter_ratio * raw;
        Duration::from_millis((capped + jitter).round() as u64)
    }
}

/// Network error codes that are always considered retryable.
pub const RETRYABLE_NETWORK_CODES: &[&str] =
    &["ECONNRESET", "ETIMEDOUT", "ECONNREFUSED", "EPIPE", "ENOTFOUND"];

/// The terminal error produced when retries are exhausted. Wraps the last
/// observed error and flags whether it was itself retryable.
#[derive(Debug, Clone)]
pub struct RetryExhausted<E> {
    pub last_error: E,
    pub attempts: u32,
    pub retry_exhausted: bool,
}

/// Run `operation` up to `config.retries + 1` times, calling `should_retry`
/// on each failure to decide whether to continue, `on_retry` before each
/// sleep, and `sleep` to perform the actual wait (injectable for tests and
/// for the worker's cooperative scheduler).
pub async fn retry<F, Fut, T, E, ShouldRetry, OnRetry, Sleep, SleepFut>(
    config: &BackoffConfig,
    mut operation: F,
    should_retry: ShouldRetry,
    mut on_retry: OnRetry,
    sleep: Sleep,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    ShouldRetry: Fn(&E, u32) -> bool,
    OnRetry: FnMut(&E, u32, Duration),
    Sleep: Fn(Duration) -> SleepFut,
    SleepFut: Future<Output = ()>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = should_retry(&err, attempt);
                if !retryable || attempt > config.retries {
                    let retry_exhausted = retryable && attempt > config.retries;
                    return Err(RetryExhausted {
                        last_error: err,
                        attempts: attempt,
                        retry_exhausted,
                    });
                }
                let delay = config.delay_for_attempt(attempt);
                on_retry(&err, attempt, delay);
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_succeeds() {
        let config = BackoffConfig::default();
        let result: Result<i32, RetryExhausted<String>> = retry(
            &config,
            |_attempt| async { Ok::<i32, String>(42) },
            |_err: &String, _attempt| true,
            |_, _, _| {},
            |_d| async {},
        )
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let config = BackoffConfig {
            retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            factor: 1.0,
            jitter_ratio: 0.0,
        };
        let attempts = RefCell::new(0);

        let result: Result<&'static str, RetryExhausted<String>> = retry(
            &config,
            |attempt| {
                *attempts.borrow_mut() = attempt;
                async move {
                    if attempt < 3 {
                        Err("transient".to_string())
                    } else {
                        Ok("done")
                    }
                }
            },
            |_err, _attempt| true,
            |_, _, _| {},
            |_d| async {},
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(*attempts.borrow(), 3);
    }

    #[tokio::test]
    async fn exhausts_retries_and_flags_retry_exhausted() {
        let config = BackoffConfig {
            retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
            factor: 1.0,
            jitter_ratio: 0.0,
        };

        let result: Result<(), RetryExhausted<String>> = retry(
            &config,
            |_attempt| async { Err::<(), String>("still failing".to_string()) },
            |_err, _attempt| true,
            |_, _, _| {},
            |_d| async {},
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3); // initial + 2 retries
        assert!(err.retry_exhausted);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let config = BackoffConfig::default();
        let attempts = RefCell::new(0);

        let result: Result<(), RetryExhausted<String>> = retry(
            &config,
            |attempt| {
                *attempts.borrow_mut() = attempt;
                async move { Err::<(), String>("permanent".to_string()) }
            },
            |_err, _attempt| false,
            |_, _, _| {},
            |_d| async {},
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(*attempts.borrow(), 1);
        assert!(!err.retry_exhausted);
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let config = BackoffConfig {
            retries: 10,
            base_delay_ms: 1000,
            max_delay_ms: 2000,
            factor: 3.0,
            jitter_ratio: 0.0,
        };
        let delay = config.delay_for_attempt(5);
        assert_eq!(delay, Duration::from_millis(2000));
    }
}
