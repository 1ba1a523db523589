//! Retry with exponential backoff for transient failures
//!
//! Every orchestrator state that touches the chain goes through this
//! helper, parameterized by an error classifier so fatal errors (reverts,
//! malformed payloads) stop immediately while connectivity blips retry.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = only the initial attempt)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on the exponentially growing delay
    pub max_delay: Duration,
    /// Backoff multiplier per attempt
    pub multiplier: f64,
    /// Jitter factor (0.0-1.0) applied around the computed delay
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.5,
        }
    }
}

impl RetryConfig {
    /// Liveness checks against a chain endpoint at startup: fixed cadence,
    /// patient.
    pub fn connect() -> Self {
        Self {
            max_retries: 20,
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(3),
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Chain queries mid-run (log scans, height polls).
    pub fn chain() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.5,
        }
    }

    /// Transaction submission: bounded attempts, exhaustion dead-letters.
    pub fn submission() -> Self {
        Self {
            max_retries: 4,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.5,
        }
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Delay for a given 0-indexed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let delayed = if self.jitter > 0.0 {
            let range = capped * self.jitter;
            let offset = rand::thread_rng().gen_range(-range..=range);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(delayed)
    }
}

/// Outcome of a retried operation, with attempt accounting for
/// dead-letter records.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub result: std::result::Result<T, E>,
    /// Attempts made (1 = succeeded on first try)
    pub attempts: u32,
}

impl<T, E> RetryResult<T, E> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> std::result::Result<T, E> {
        self.result
    }
}

/// Retry executor.
pub struct Retry {
    config: RetryConfig,
}

impl Retry {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run an operation, retrying every failure up to the budget.
    pub async fn run<F, Fut, T, E>(&self, context: &str, operation: F) -> RetryResult<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_classified(context, operation, |_| true).await
    }

    /// Run an operation with a transient-vs-fatal classifier.
    ///
    /// `is_transient` receives each error; returning false stops the loop
    /// immediately and surfaces that error.
    pub async fn run_classified<F, Fut, T, E, P>(
        &self,
        context: &str,
        operation: F,
        is_transient: P,
    ) -> RetryResult<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match operation().await {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::info!(context, attempts, "operation succeeded after retries");
                    }
                    return RetryResult {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(e) => {
                    if attempts > self.config.max_retries || !is_transient(&e) {
                        tracing::warn!(
                            context,
                            attempts,
                            error = %e,
                            "operation failed, retry budget exhausted or error fatal"
                        );
                        return RetryResult {
                            result: Err(e),
                            attempts,
                        };
                    }

                    let delay = self.config.delay_for_attempt(attempts - 1);
                    tracing::warn!(
                        context,
                        attempt = attempts,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "operation failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.0,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn connect_preset_is_fixed_cadence() {
        let config = RetryConfig::connect();
        assert_eq!(config.delay_for_attempt(0), config.delay_for_attempt(7));
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let result = Retry::new(fast()).run("test", || async { Ok::<_, &str>(42) }).await;
        assert!(result.is_success());
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn succeeds_after_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result = Retry::new(fast())
            .run("test", || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("not yet")
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn exhausts_budget() {
        let result = Retry::new(fast().with_max_retries(2))
            .run("test", || async { Err::<i32, _>("always fails") })
            .await;

        assert!(!result.is_success());
        assert_eq!(result.attempts, 3); // initial + 2 retries
    }

    #[tokio::test]
    async fn fatal_errors_stop_immediately() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: RetryResult<i32, &str> = Retry::new(fast())
            .run_classified(
                "test",
                || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err("reverted")
                    }
                },
                |e| *e != "reverted",
            )
            .await;

        assert!(!result.is_success());
        assert_eq!(result.attempts, 1);
    }
}
