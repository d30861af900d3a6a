pub mod batch_queue;
pub mod cache;
pub mod paginator;
pub mod properties;
pub mod rate_limiter;
pub mod retry;
