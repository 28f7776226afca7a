//! Retry + circuit breaker for outbound provider HTTP calls. Grounded in
//! the teacher's `recovery.rs` (`RetryConfig`, exponential backoff,
//! `CircuitBreaker`), generalized from database/Redis operations to
//! `ProviderPort` calls. Distinct from `RecoverySweeper`, which recovers
//! stale task records rather than retrying a single outbound request.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

/// Retries `operation` with exponential backoff. Only retries errors a
/// vendor call can plausibly recover from (`ProviderError`, `Timeout`);
/// `AuthError`/`InvalidArgument`/etc. are not transient and fail fast.
pub async fn retry_provider_call<F, Fut, T>(operation: F, config: &RetryConfig, operation_name: &str) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = config.initial_delay;
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(operation = operation_name, attempt, "provider call succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) if !is_retryable(&err) => return Err(err),
            Err(err) => {
                last_error = Some(err);
                if attempt < config.max_attempts {
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %last_error.as_ref().unwrap(),
                        "provider call failed, retrying"
                    );
                    sleep(delay).await;
                    delay = std::cmp::min(
                        Duration::from_millis((delay.as_millis() as f64 * config.backoff_multiplier) as u64),
                        config.max_delay,
                    );
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| CoreError::Internal("retry exhausted with no recorded error".to_string())))
}

fn is_retryable(err: &CoreError) -> bool {
    matches!(err, CoreError::ProviderError { .. } | CoreError::Timeout(_))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Trips after `failure_threshold` consecutive failures against a single
/// provider, giving a struggling vendor `recovery_timeout` to recover
/// before the `Matcher`/transfer handler sends it more traffic.
pub struct CircuitBreaker {
    inner: Mutex<CircuitBreakerInner>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

struct CircuitBreakerInner {
    state: CircuitBreakerState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(CircuitBreakerInner {
                state: CircuitBreakerState::Closed,
                failure_count: 0,
                last_failure_time: None,
            }),
            failure_threshold,
            recovery_timeout,
        }
    }

    pub fn state(&self) -> CircuitBreakerState {
        self.inner.lock().unwrap().state
    }

    fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::HalfOpen => true,
            CircuitBreakerState::Open => {
                let elapsed = inner.last_failure_time.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.recovery_timeout {
                    inner.state = CircuitBreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CircuitBreakerState::HalfOpen {
            info!("circuit breaker closed after successful recovery");
        }
        inner.state = CircuitBreakerState::Closed;
        inner.failure_count = 0;
        inner.last_failure_time = None;
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());
        match inner.state {
            CircuitBreakerState::Closed if inner.failure_count >= self.failure_threshold => {
                inner.state = CircuitBreakerState::Open;
                warn!(failures = inner.failure_count, "circuit breaker opened");
            }
            CircuitBreakerState::HalfOpen => {
                inner.state = CircuitBreakerState::Open;
                warn!("circuit breaker reopened after failed recovery attempt");
            }
            _ => {}
        }
    }

    /// Runs `operation` if the breaker is closed/half-open, else fails fast
    /// with `ProviderError` naming `service_name`.
    pub async fn call<Fut, T>(&self, service_name: &str, operation: Fut) -> Result<T>
    where
        Fut: std::future::Future<Output = Result<T>>,
    {
        if !self.can_execute() {
            return Err(CoreError::ProviderError {
                provider: service_name.to_string(),
                message: "circuit breaker open".to_string(),
            });
        }
        match operation.await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_transient_error_then_succeeds() {
        let counter = Arc::new(AtomicU32::new(0));
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        };
        let result = retry_provider_call(
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CoreError::ProviderError { provider: "spotify".into(), message: "503".into() })
                    } else {
                        Ok("ok")
                    }
                }
            },
            &config,
            "get_playlist",
        )
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let result: Result<()> = retry_provider_call(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(CoreError::AuthError { provider: "spotify".into(), message: "expired".into() })
                }
            },
            &RetryConfig::default(),
            "get_playlist",
        )
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn circuit_breaker_opens_after_threshold_and_half_opens_after_timeout() {
        let cb = CircuitBreaker::new(2, Duration::from_millis(20));
        assert_eq!(cb.state(), CircuitBreakerState::Closed);

        let _ = cb.call("spotify", async { Err::<(), _>(CoreError::ProviderError { provider: "spotify".into(), message: "x".into() }) }).await;
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
        let _ = cb.call("spotify", async { Err::<(), _>(CoreError::ProviderError { provider: "spotify".into(), message: "x".into() }) }).await;
        assert_eq!(cb.state(), CircuitBreakerState::Open);

        let rejected = cb.call("spotify", async { Ok::<_, CoreError>(()) }).await;
        assert!(rejected.is_err());

        tokio::time::sleep(Duration::from_millis(25)).await;
        let recovered = cb.call("spotify", async { Ok::<_, CoreError>(()) }).await;
        assert!(recovered.is_ok());
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
    }
}
