//! Token bucket rate limiting and keyed limiter storage.

mod backend;
mod bucket;
mod limiter;
mod store;

pub use backend::{DashMapBackend, LimiterBackend, ShardedMemoryBackend, DEFAULT_SHARD_COUNT};
pub use bucket::{BucketConfig, BucketStats, TokenBucket, DEFAULT_FILL_COUNT, DEFAULT_FILL_INTERVAL};
pub use limiter::{Limiter, RateLimiter};
pub use store::LimiterStore;
