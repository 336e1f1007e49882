//! Bounded retry with exponential backoff, applied by the coordinator
//! around adapter calls. Only transient errors retry; fatal and
//! malformed responses return immediately. Backoff is base * 3^attempt
//! plus random jitter (0-1s).

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use soledex_common::{ErrorClass, RetryConfig, SourceError};

pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: config.base_backoff,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }
        let backoff = self.base * 3u32.pow(attempt);
        let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
        backoff + jitter
    }

    /// Run an operation, retrying transient failures up to the attempt
    /// limit. A rate-limit hint from the source extends the computed
    /// backoff when it is longer.
    pub async fn run<T, F, Fut>(&self, op: &str, mut f: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let retryable = err.class() == ErrorClass::Transient
                        && attempt + 1 < self.max_attempts;
                    if !retryable {
                        return Err(err);
                    }

                    let mut delay = self.backoff(attempt);
                    if let SourceError::RateLimited {
                        retry_after: Some(hint),
                    } = &err
                    {
                        delay = delay.max(*hint);
                    }
                    warn!(
                        op,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            base_backoff: Duration::ZERO,
        })
    }

    #[tokio::test]
    async fn transient_errors_retry_up_to_the_limit() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(3)
            .run("fetch", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::Timeout) }
            })
            .await;
        assert!(matches!(result, Err(SourceError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn malformed_responses_never_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(3)
            .run("fetch", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::BadResponse("truncated".into())) }
            })
            .await;
        assert!(matches!(result, Err(SourceError::BadResponse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fatal_errors_never_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(3)
            .run("fetch", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::Auth("bad key".into())) }
            })
            .await;
        assert!(matches!(result, Err(SourceError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_after_a_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = policy(3)
            .run("fetch", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(SourceError::Timeout)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
        });
        assert!(policy.backoff(0) >= Duration::from_secs(1));
        assert!(policy.backoff(1) >= Duration::from_secs(3));
        assert!(policy.backoff(2) >= Duration::from_secs(9));
    }
}
