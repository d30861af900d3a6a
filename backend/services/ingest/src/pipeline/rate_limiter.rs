use std::future::Future;
use std::time::Duration;

use crmsync_config::LimiterConfig;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

/// Token bucket with a concurrency cap, guarding auxiliary enrichment calls.
///
/// A call proceeds once it holds one of `max_concurrent` slots and has taken
/// a token. Both the slot semaphore and the bucket mutex queue waiters in
/// FIFO order. The bucket starts full and gains `refill_amount` tokens per
/// elapsed `refill_interval`, capped at `capacity`.
pub struct RateLimiter {
    capacity: u32,
    refill_amount: u32,
    refill_interval: Duration,
    slots: Semaphore,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            capacity: config.capacity,
            refill_amount: config.refill_amount,
            refill_interval: config.refill_interval(),
            slots: Semaphore::new(config.max_concurrent),
            bucket: Mutex::new(Bucket {
                tokens: config.capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Run `call` under the limiter.
    pub async fn run<F, Fut, T>(&self, call: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // The semaphore is never closed, so the permit is always present.
        let _slot = self.slots.acquire().await.ok();
        self.take_token().await;
        call().await
    }

    /// Tokens currently available, after applying any due refill.
    #[cfg(test)]
    pub async fn available(&self) -> u32 {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        bucket.tokens
    }

    async fn take_token(&self) {
        let mut bucket = self.bucket.lock().await;
        loop {
            self.refill(&mut bucket);
            if bucket.tokens > 0 {
                bucket.tokens -= 1;
                return;
            }
            let next_refill = bucket.last_refill + self.refill_interval;
            tracing::trace!(
                wait_ms = next_refill.saturating_duration_since(Instant::now()).as_millis() as u64,
                "rate limiter out of tokens, waiting for refill"
            );
            tokio::time::sleep_until(next_refill).await;
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let elapsed = Instant::now().saturating_duration_since(bucket.last_refill);
        let intervals = elapsed.as_nanos() / self.refill_interval.as_nanos().max(1);
        if intervals == 0 {
            return;
        }

        let intervals = u32::try_from(intervals).unwrap_or(u32::MAX);
        let added = intervals.saturating_mul(self.refill_amount);
        bucket.tokens = bucket.tokens.saturating_add(added).min(self.capacity);
        bucket.last_refill += self.refill_interval.saturating_mul(intervals);
    }
}
