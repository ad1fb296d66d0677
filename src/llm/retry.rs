//! Exponential-backoff retry over transient provider failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::{AppError, Result};

/// Per-provider retry policy. Only errors the coordinator classifies as
/// transient (rate-limit, timeout, connection, 5xx) are retried; everything
/// else short-circuits to the caller.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Exponential backoff with ±10% jitter.
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64() * 2_f64.powi(attempt.saturating_sub(1) as i32);
        let jitter = base * 0.1;
        let wait = base + rand::thread_rng().gen_range(-jitter..=jitter);
        Duration::from_secs_f64(wait.max(0.0))
    }

    pub async fn run<T, F, Fut>(&self, provider: &str, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if is_retryable(&err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        tracing::warn!(
                            provider = %provider,
                            operation = %operation,
                            attempts = attempt,
                            error = %err,
                            "Provider call exhausted retries"
                        );
                        return Err(err);
                    }
                    let wait = self.delay_for(attempt);
                    tracing::info!(
                        provider = %provider,
                        operation = %operation,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "Retrying transient provider error"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn is_retryable(err: &AppError) -> bool {
    matches!(
        err,
        AppError::ProviderTransient { .. } | AppError::RateLimitExceeded { .. }
    )
}

/// Map an upstream HTTP status to a coordinator error.
pub fn error_for_status(provider: &str, status: u16, body: String) -> AppError {
    match status {
        429 => AppError::ProviderTransient {
            provider: provider.to_string(),
            message: format!("rate limited: {}", body),
        },
        408 => AppError::ProviderTransient {
            provider: provider.to_string(),
            message: format!("timeout: {}", body),
        },
        500..=599 => AppError::ProviderTransient {
            provider: provider.to_string(),
            message: format!("server error ({}): {}", status, body),
        },
        _ => AppError::ProviderFatal {
            provider: provider.to_string(),
            message: format!("status {}: {}", status, body),
        },
    }
}

/// Map a transport error (connect failure, timeout, bad body) to a
/// coordinator error.
pub fn error_for_transport(provider: &str, err: reqwest::Error) -> AppError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        AppError::ProviderTransient {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    } else {
        AppError::ProviderFatal {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn transient_statuses_are_retryable() {
        assert!(is_retryable(&error_for_status("p", 429, String::new())));
        assert!(is_retryable(&error_for_status("p", 503, String::new())));
        assert!(is_retryable(&error_for_status("p", 408, String::new())));
        assert!(!is_retryable(&error_for_status("p", 401, String::new())));
        assert!(!is_retryable(&error_for_status("p", 404, String::new())));
        assert!(!is_retryable(&error_for_status("p", 400, String::new())));
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result = policy
            .run("p", "op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AppError::ProviderTransient {
                            provider: "p".to_string(),
                            message: "boom".to_string(),
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_short_circuit() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result: Result<()> = policy
            .run("p", "op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(AppError::ProviderFatal {
                        provider: "p".to_string(),
                        message: "bad key".to_string(),
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        let first = policy.delay_for(1);
        let third = policy.delay_for(3);
        assert!(third > first);
        // Jitter stays within ±10%.
        assert!(first >= Duration::from_millis(90) && first <= Duration::from_millis(110));
    }
}
