//! Exponential-backoff retry around a unit of work, filtered by error kind.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 10 }
    }
}

/// Delay before attempt `n` (1-based) is `2^n` seconds, uncapped, no jitter.
fn delay_for_attempt(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

/// Retries `operation` while `is_transient` accepts the error, sleeping
/// `2^n` seconds between attempt `n` and `n+1`. On exhaustion the last error
/// is returned. A non-transient error propagates immediately without
/// consuming an attempt against anything.
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation: F,
    config: &RetryConfig,
    is_transient: impl Fn(&E) -> bool,
    context: &str,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(context, attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if !is_transient(&e) {
                    return Err(e);
                }
                if attempt >= config.max_attempts {
                    warn!(context, attempts = attempt, error = %e, "operation failed after max retries");
                    return Err(e);
                }

                let delay = delay_for_attempt(attempt);
                warn!(
                    context,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "operation failed, retrying with backoff"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn succeeds_on_first_attempt_without_sleeping() {
        let config = RetryConfig::default();
        let result =
            retry_with_backoff(|| async { Ok::<_, String>(42) }, &config, |_: &String| true, "ctx")
                .await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn non_transient_error_is_attempted_exactly_once() {
        let config = RetryConfig::default();
        let attempts = Arc::new(Mutex::new(0));
        let attempts_clone = attempts.clone();

        let result = retry_with_backoff(
            move || {
                let attempts = attempts_clone.clone();
                async move {
                    *attempts.lock().unwrap() += 1;
                    Err::<i32, _>("permanent".to_string())
                }
            },
            &config,
            |_: &String| false,
            "ctx",
        )
        .await;

        assert_eq!(result, Err("permanent".to_string()));
        assert_eq!(*attempts.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_follow_the_2_pow_n_schedule() {
        let config = RetryConfig { max_attempts: 4 };
        let attempts = Arc::new(Mutex::new(0));
        let attempts_clone = attempts.clone();

        let start = tokio::time::Instant::now();
        let result = retry_with_backoff(
            move || {
                let attempts = attempts_clone.clone();
                async move {
                    let mut n = attempts.lock().unwrap();
                    *n += 1;
                    if *n < 4 {
                        Err::<i32, _>("transient".to_string())
                    } else {
                        Ok(99)
                    }
                }
            },
            &config,
            |_: &String| true,
            "ctx",
        )
        .await;

        assert_eq!(result, Ok(99));
        // 2^1 + 2^2 + 2^3 = 14s between the four attempts.
        assert!(start.elapsed() >= Duration::from_secs(14));
    }
}
