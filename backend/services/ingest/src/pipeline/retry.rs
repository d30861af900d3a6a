use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crmsync_config::RetryPolicy;

use crate::error::SyncError;

/// Bounded retry-with-backoff around a single remote call.
///
/// Between attempts the `on_retry` hook runs first (credential refresh),
/// then the executor sleeps `backoff_base * 2^attempt` where `attempt`
/// counts failures so far. The executor does not classify errors: every
/// failure is retried until the attempt budget is spent.
#[derive(Debug, Clone, Copy)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_retries + 1
    }

    /// Backoff after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.policy.backoff_base_ms.saturating_mul(factor))
    }

    pub async fn execute<T, E, Op, Fut, Hook, HookFut>(
        &self,
        operation: &str,
        mut op: Op,
        mut on_retry: Hook,
    ) -> Result<T, SyncError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        Hook: FnMut() -> HookFut,
        HookFut: Future<Output = ()>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0u32;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            attempt += 1;
            let last_error = err.to_string();
            tracing::warn!(operation, attempt, max_attempts, error = %last_error, "remote call failed");

            if attempt >= max_attempts {
                tracing::error!(operation, attempts = attempt, "retries exhausted, aborting");
                return Err(SyncError::ExhaustedRetries {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last_error,
                });
            }

            on_retry().await;

            let delay = self.delay_for(attempt);
            tracing::debug!(operation, attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn executor() -> RetryExecutor {
        RetryExecutor::new(RetryPolicy {
            max_retries: 4,
            backoff_base_ms: 5_000,
        })
    }

    #[test]
    fn delays_double_from_ten_seconds() {
        let ex = executor();
        let delays: Vec<u64> = (1..=4).map(|a| ex.delay_for(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![10_000, 20_000, 40_000, 80_000]);
        assert_eq!(ex.max_attempts(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn five_failures_exhaust_with_refresh_before_each_retry() {
        let ex = executor();
        let start = Instant::now();
        let attempts_at = Mutex::new(Vec::new());
        let hooks_at = Mutex::new(Vec::new());

        let result: Result<(), SyncError> = ex
            .execute(
                "search contacts",
                || {
                    attempts_at.lock().unwrap().push(start.elapsed());
                    async { Err::<(), _>("503 service unavailable") }
                },
                || {
                    hooks_at.lock().unwrap().push(start.elapsed());
                    async {}
                },
            )
            .await;

        match result {
            Err(SyncError::ExhaustedRetries {
                operation,
                attempts,
                last_error,
            }) => {
                assert_eq!(operation, "search contacts");
                assert_eq!(attempts, 5);
                assert_eq!(last_error, "503 service unavailable");
            }
            other => panic!("expected ExhaustedRetries, got: {other:?}"),
        }

        let attempts = attempts_at.into_inner().unwrap();
        let hooks = hooks_at.into_inner().unwrap();
        assert_eq!(attempts.len(), 5);
        assert_eq!(hooks.len(), 4);

        let gaps: Vec<u64> = attempts
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis() as u64)
            .collect();
        assert_eq!(gaps, vec![10_000, 20_000, 40_000, 80_000]);

        // each refresh happens after a failure and before the next attempt
        for (i, hook) in hooks.iter().enumerate() {
            assert!(*hook >= attempts[i] && *hook <= attempts[i + 1]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let ex = executor();
        let calls = AtomicU32::new(0);
        let hooks = AtomicU32::new(0);

        let value = ex
            .execute(
                "search companies",
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err("timeout".to_string())
                        } else {
                            Ok(42)
                        }
                    }
                },
                || {
                    hooks.fetch_add(1, Ordering::SeqCst);
                    async {}
                },
            )
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(hooks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_skips_hook_and_sleep() {
        let ex = executor();
        let start = Instant::now();
        let hooks = AtomicU32::new(0);

        let value = ex
            .execute(
                "noop",
                || async { Ok::<_, String>("ok") },
                || {
                    hooks.fetch_add(1, Ordering::SeqCst);
                    async {}
                },
            )
            .await
            .unwrap();

        assert_eq!(value, "ok");
        assert_eq!(hooks.load(Ordering::SeqCst), 0);
        assert_eq!(start.elapsed(), std::time::Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_fails_on_first_error() {
        let ex = RetryExecutor::new(RetryPolicy {
            max_retries: 0,
            backoff_base_ms: 5_000,
        });
        let err = ex
            .execute("once", || async { Err::<(), _>("boom") }, || async {})
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ExhaustedRetries { attempts: 1, .. }));
    }
}
