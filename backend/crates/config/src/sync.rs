use std::time::Duration;

use crmsync_common::error::{CrmsyncError, CrmsyncResult};
use serde::Deserialize;

use crate::env::get_parsed_or;

/// Retry-with-backoff policy for remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff_base_ms * 2^n`.
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            backoff_base_ms: 5_000,
        }
    }
}

/// Token bucket settings for auxiliary enrichment calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LimiterConfig {
    pub capacity: u32,
    pub refill_amount: u32,
    pub refill_interval_ms: u64,
    pub max_concurrent: usize,
}

impl LimiterConfig {
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            refill_amount: 100,
            refill_interval_ms: 10_000,
            max_concurrent: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub retry: RetryPolicy,
    /// `after` offset at which pagination restarts from a tightened date range.
    pub overflow_threshold: u32,
    pub page_limit: u32,
    /// Buffer length above which the batch queue flushes to the sink.
    pub flush_threshold: usize,
    pub queue_capacity: usize,
    pub meeting_batch_size: usize,
    pub cache_ttl_secs: u64,
    /// Upper bound on cached enrichment entries.
    pub cache_max_entries: u64,
    pub limiter: LimiterConfig,
    /// When false, action batches are logged and discarded (dry run).
    pub persist_actions: bool,
    /// When false, domain state is never written back.
    pub persist_domain: bool,
    /// Run the worker repeatedly at this period instead of once.
    pub interval_secs: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            overflow_threshold: 9_900,
            page_limit: 100,
            flush_threshold: 100,
            queue_capacity: 1_024,
            meeting_batch_size: 10,
            cache_ttl_secs: 3_600,
            cache_max_entries: 10_000,
            limiter: LimiterConfig::default(),
            persist_actions: true,
            persist_domain: true,
            interval_secs: None,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> CrmsyncResult<Self> {
        let d = Self::default();

        let interval_secs = match std::env::var("SYNC_INTERVAL_SECS") {
            Ok(raw) => Some(raw.trim().parse().map_err(|e| {
                CrmsyncError::Config(format!("invalid SYNC_INTERVAL_SECS: {e}"))
            })?),
            Err(_) => None,
        };

        let cfg = Self {
            retry: RetryPolicy {
                max_retries: get_parsed_or("SYNC_MAX_RETRIES", d.retry.max_retries)?,
                backoff_base_ms: get_parsed_or("SYNC_BACKOFF_BASE_MS", d.retry.backoff_base_ms)?,
            },
            overflow_threshold: get_parsed_or("SYNC_OVERFLOW_THRESHOLD", d.overflow_threshold)?,
            page_limit: get_parsed_or("SYNC_PAGE_LIMIT", d.page_limit)?,
            flush_threshold: get_parsed_or("SYNC_FLUSH_THRESHOLD", d.flush_threshold)?,
            queue_capacity: get_parsed_or("SYNC_QUEUE_CAPACITY", d.queue_capacity)?,
            meeting_batch_size: get_parsed_or("SYNC_MEETING_BATCH_SIZE", d.meeting_batch_size)?,
            cache_ttl_secs: get_parsed_or("SYNC_CACHE_TTL_SECS", d.cache_ttl_secs)?,
            cache_max_entries: get_parsed_or("SYNC_CACHE_MAX_ENTRIES", d.cache_max_entries)?,
            limiter: LimiterConfig {
                capacity: get_parsed_or("LIMITER_CAPACITY", d.limiter.capacity)?,
                refill_amount: get_parsed_or("LIMITER_REFILL_AMOUNT", d.limiter.refill_amount)?,
                refill_interval_ms: get_parsed_or(
                    "LIMITER_REFILL_INTERVAL_MS",
                    d.limiter.refill_interval_ms,
                )?,
                max_concurrent: get_parsed_or("LIMITER_MAX_CONCURRENT", d.limiter.max_concurrent)?,
            },
            persist_actions: get_parsed_or("SYNC_PERSIST_ACTIONS", d.persist_actions)?,
            persist_domain: get_parsed_or("SYNC_PERSIST_DOMAIN", d.persist_domain)?,
            interval_secs,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CrmsyncResult<()> {
        let checks: [(&str, bool); 10] = [
            ("SYNC_OVERFLOW_THRESHOLD", self.overflow_threshold > 0),
            ("SYNC_PAGE_LIMIT", self.page_limit > 0),
            ("SYNC_FLUSH_THRESHOLD", self.flush_threshold > 0),
            ("SYNC_QUEUE_CAPACITY", self.queue_capacity > 0),
            ("SYNC_MEETING_BATCH_SIZE", self.meeting_batch_size > 0),
            ("SYNC_CACHE_MAX_ENTRIES", self.cache_max_entries > 0),
            ("LIMITER_CAPACITY", self.limiter.capacity > 0),
            ("LIMITER_REFILL_AMOUNT", self.limiter.refill_amount > 0),
            ("LIMITER_REFILL_INTERVAL_MS", self.limiter.refill_interval_ms > 0),
            ("LIMITER_MAX_CONCURRENT", self.limiter.max_concurrent > 0),
        ];

        for (key, ok) in checks {
            if !ok {
                return Err(CrmsyncError::Config(format!("{key} must be greater than zero")));
            }
        }

        if self.interval_secs == Some(0) {
            return Err(CrmsyncError::Config(
                "SYNC_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
