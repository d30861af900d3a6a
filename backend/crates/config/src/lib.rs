pub mod env;
pub mod sync;
pub mod tracing_init;

pub use env::AppConfig;
pub use sync::{LimiterConfig, RetryPolicy, SyncConfig};
pub use tracing_init::init_tracing;
