use std::future::Future;
use std::time::Duration;

use super::breaker::CircuitBreaker;
use super::error::OutboundError;
use crate::config::ResilienceConfig;

// ─── RetryPolicy ─────────────────────────────────────────────────────────────

/// Backoff and timeout parameters for [`RetryExecutor`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per call; the first attempt is attempt 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Wall-clock bound applied to each attempt.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            attempt_timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}

// ─── RetryExecutor ───────────────────────────────────────────────────────────

/// Wraps outbound calls with per-attempt timeouts, exponential backoff on
/// retryable errors, and the per-endpoint circuit breaker.
pub struct RetryExecutor {
    policy: RetryPolicy,
    breaker: CircuitBreaker,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, breaker: CircuitBreaker) -> Self {
        Self { policy, breaker }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(
            RetryPolicy::from_config(config),
            CircuitBreaker::new(
                config.failure_threshold,
                Duration::from_millis(config.open_duration_ms),
            ),
        )
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run `op` against `endpoint` under the full resilience envelope.
    ///
    /// Fast-fails with `circuit_open` while the endpoint's breaker is open.
    /// Each attempt is bounded by `attempt_timeout`; retryable failures back
    /// off exponentially (doubling from `initial_backoff`, capped at
    /// `max_backoff`), and a server `Retry-After` overrides the computed
    /// delay (clamped to `max_backoff`).  Non-retryable failures surface
    /// immediately.
    pub async fn execute<T, F, Fut>(&self, endpoint: &str, mut op: F) -> Result<T, OutboundError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OutboundError>>,
    {
        self.breaker.check(endpoint)?;

        let mut backoff = self.policy.initial_backoff;
        let mut attempt = 1u32;

        loop {
            let result = match tokio::time::timeout(self.policy.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_elapsed) => Err(OutboundError::Timeout(self.policy.attempt_timeout)),
            };

            match result {
                Ok(value) => {
                    self.breaker.record_success(endpoint);
                    return Ok(value);
                }
                Err(error) => {
                    if error.counts_toward_breaker() {
                        self.breaker.record_failure(endpoint);
                    }
                    if !error.is_retryable() || attempt >= self.policy.max_attempts {
                        return Err(error);
                    }

                    let delay = error
                        .retry_after()
                        .map(|d| d.min(self.policy.max_backoff))
                        .unwrap_or(backoff);
                    tracing::debug!(
                        endpoint = %endpoint,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying outbound call"
                    );
                    tokio::time::sleep(delay).await;

                    backoff = (backoff * 2).min(self.policy.max_backoff);
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor(max_attempts: u32, failure_threshold: u32) -> RetryExecutor {
        RetryExecutor::new(
            RetryPolicy {
                max_attempts,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
                attempt_timeout: Duration::from_millis(200),
            },
            CircuitBreaker::new(failure_threshold, Duration::from_millis(50)),
        )
    }

    #[tokio::test]
    async fn transient_failures_are_retried_to_success() {
        let executor = executor(3, 10);
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in = calls.clone();
        let result = executor
            .execute("api", move || {
                let calls = calls_in.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(OutboundError::http(503, "unavailable"))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_surface_immediately() {
        let executor = executor(3, 10);
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in = calls.clone();
        let result: Result<(), _> = executor
            .execute("api", move || {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(OutboundError::http(400, "bad request"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no retry on 400");
    }

    #[tokio::test]
    async fn attempts_are_capped() {
        let executor = executor(3, 10);
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in = calls.clone();
        let result: Result<(), _> = executor
            .execute("api", move || {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(OutboundError::Io("connection reset".into()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3, "max_attempts total calls");
    }

    #[tokio::test]
    async fn timed_out_attempt_is_retried() {
        let executor = RetryExecutor::new(
            RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
                attempt_timeout: Duration::from_millis(20),
            },
            CircuitBreaker::new(10, Duration::from_millis(50)),
        );
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in = calls.clone();
        let result = executor
            .execute("api", move || {
                let calls = calls_in.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        // First attempt hangs past the per-attempt timeout.
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Ok("late but fine")
                }
            })
            .await;

        assert_eq!(result, Ok("late but fine"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn breaker_fast_fails_after_threshold() {
        let executor = executor(1, 2);

        for _ in 0..2 {
            let _: Result<(), _> = executor
                .execute("api", || async { Err(OutboundError::http(500, "boom")) })
                .await;
        }

        // Breaker is now open: the op must not run.
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let result: Result<(), _> = executor
            .execute("api", move || {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(OutboundError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn breaker_recovers_after_open_window() {
        let executor = executor(1, 1);
        let _: Result<(), _> = executor
            .execute("api", || async { Err(OutboundError::http(500, "boom")) })
            .await;
        assert!(executor.breaker().is_open("api"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        let result = executor.execute("api", || async { Ok("recovered") }).await;
        assert_eq!(result, Ok("recovered"));
        assert_eq!(executor.breaker().consecutive_failures("api"), 0);
    }

    #[tokio::test]
    async fn retry_after_is_honored_and_clamped() {
        let executor = executor(2, 10);
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in = calls.clone();
        let start = std::time::Instant::now();
        let result = executor
            .execute("api", move || {
                let calls = calls_in.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(OutboundError::Http {
                            status: 429,
                            message: "slow down".into(),
                            // Far larger than max_backoff — must be clamped.
                            retry_after: Some(Duration::from_secs(60)),
                        })
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("ok"));
        assert!(
            start.elapsed() < Duration::from_secs(1),
            "Retry-After must be clamped to max_backoff"
        );
    }
}
