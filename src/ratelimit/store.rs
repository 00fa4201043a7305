//! Keyed limiter store.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use super::backend::{LimiterBackend, ShardedMemoryBackend};
use super::bucket::BucketConfig;
use super::limiter::{Limiter, RateLimiter};

/// Lazily builds and caches one [`RateLimiter`] per key.
///
/// Every key gets a bucket with the same configuration. The store does not
/// treat a zero rate specially: such a store rejects everything, so callers
/// that mean "disabled" should not build one.
#[derive(Clone)]
pub struct LimiterStore {
    config: BucketConfig,
    backend: Arc<dyn LimiterBackend>,
}

impl LimiterStore {
    /// Create a store on top of `backend`.
    pub fn new(
        max_rate: u64,
        fill_interval_ms: u64,
        fill_count: u64,
        backend: Arc<dyn LimiterBackend>,
    ) -> Self {
        let config = BucketConfig::new(
            max_rate,
            Duration::from_millis(fill_interval_ms),
            fill_count,
        );
        Self::with_config(config, backend)
    }

    /// Create a store on top of `backend` from an already built configuration.
    pub fn with_config(config: BucketConfig, backend: Arc<dyn LimiterBackend>) -> Self {
        Self { config, backend }
    }

    /// Create a store on a default [`ShardedMemoryBackend`].
    pub fn memory(max_rate: u64, fill_interval_ms: u64, fill_count: u64) -> Self {
        Self::new(
            max_rate,
            fill_interval_ms,
            fill_count,
            Arc::new(ShardedMemoryBackend::new()),
        )
    }

    /// The limiter for `key`, created on first use.
    pub fn get(&self, key: &str) -> Arc<dyn Limiter> {
        let config = self.config;
        self.backend
            .load(key, &move || Arc::new(RateLimiter::new(config)) as Arc<dyn Limiter>)
    }

    /// Take one token from the limiter for `key`.
    pub fn allow(&self, key: &str) -> bool {
        let allowed = self.get(key).allow();
        trace!(key = %key, allowed = allowed, "Keyed rate limit decision");
        allowed
    }

    /// Number of keys with a limiter.
    pub fn len(&self) -> usize {
        self.backend.len()
    }

    /// Whether no key has a limiter yet.
    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    /// Configuration applied to every key.
    pub fn config(&self) -> BucketConfig {
        self.config
    }
}

impl std::fmt::Debug for LimiterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterStore")
            .field("config", &self.config)
            .field("keys", &self.backend.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::DashMapBackend;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_store_creates_limiter_lazily() {
        let store = LimiterStore::memory(5, 60_000, 1);
        assert!(store.is_empty());

        assert!(store.allow("route:/orders"));
        assert_eq!(store.len(), 1);

        assert!(store.allow("route:/orders"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_keys_are_limited_independently() {
        let store = LimiterStore::memory(2, 60_000, 1);

        assert!(store.allow("client:1"));
        assert!(store.allow("client:1"));
        assert!(!store.allow("client:1"));

        // Another key still has its full budget
        assert!(store.allow("client:2"));
        assert!(store.allow("client:2"));
        assert!(!store.allow("client:2"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_defaults_applied_to_every_key() {
        let store = LimiterStore::memory(10, 0, 0);
        let config = store.config();

        assert_eq!(config.capacity, 10);
        assert_eq!(config.fill_interval, Duration::from_millis(100));
        assert_eq!(config.fill_count, 2);
    }

    #[test]
    fn test_concurrent_callers_share_one_bucket() {
        let store = LimiterStore::new(50, 60_000, 1, Arc::new(DashMapBackend::new()));
        let barrier = Arc::new(Barrier::new(10));
        let mut handles = vec![];

        for _ in 0..10 {
            let store = store.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                (0..10).filter(|_| store.allow("backend:inventory")).count()
            }));
        }

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // One shared bucket of 50, not ten buckets
        assert_eq!(granted, 50);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_same_instance_returned_for_key() {
        let store = LimiterStore::memory(3, 60_000, 1);
        let first = store.get("A");
        let second = store.get("A");
        assert!(Arc::ptr_eq(&first, &second));
    }
}
