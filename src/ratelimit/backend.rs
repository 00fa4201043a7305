//! Keyed limiter backends.
//!
//! A backend maps keys to limiter instances and guarantees that, for any key,
//! the factory runs at most once no matter how many callers race on the first
//! lookup. The in-memory backends here never evict entries.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use super::limiter::Limiter;

/// Number of shards used by [`ShardedMemoryBackend::new`].
pub const DEFAULT_SHARD_COUNT: usize = 32;

/// Trait for keyed limiter caches.
///
/// This abstracts the default in-memory sharded map so that a shared or remote
/// store can be swapped in without touching callers.
pub trait LimiterBackend: Send + Sync {
    /// Return the limiter for `key`, building it with `factory` on first use.
    ///
    /// Implementations must publish the first constructed instance and return
    /// it to every later or concurrent caller for the same key.
    fn load(&self, key: &str, factory: &dyn Fn() -> Arc<dyn Limiter>) -> Arc<dyn Limiter>;

    /// Number of keys currently held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type Shard = RwLock<HashMap<String, Arc<dyn Limiter>>>;

/// In-memory backend split into independently locked shards.
///
/// Lookups for keys in different shards never contend. Within a shard, the
/// first caller to miss constructs and publishes the limiter while holding the
/// shard's write lock; everyone else either hits the read path or waits on
/// that lock briefly.
pub struct ShardedMemoryBackend {
    shards: Box<[Shard]>,
    hasher: RandomState,
}

impl ShardedMemoryBackend {
    /// Create a backend with [`DEFAULT_SHARD_COUNT`] shards.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARD_COUNT)
    }

    /// Create a backend with `count` shards (at least one).
    pub fn with_shards(count: usize) -> Self {
        let shards = (0..count.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shards,
            hasher: RandomState::new(),
        }
    }

    /// Number of independently locked shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_for(&self, key: &str) -> &Shard {
        let hash = self.hasher.hash_one(key);
        &self.shards[(hash % self.shards.len() as u64) as usize]
    }
}

impl Default for ShardedMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LimiterBackend for ShardedMemoryBackend {
    fn load(&self, key: &str, factory: &dyn Fn() -> Arc<dyn Limiter>) -> Arc<dyn Limiter> {
        let shard = self.shard_for(key);

        if let Some(limiter) = shard.read().get(key) {
            return limiter.clone();
        }

        let mut entries = shard.write();
        // Another caller may have published while we waited for the write lock
        if let Some(limiter) = entries.get(key) {
            return limiter.clone();
        }

        debug!(key = %key, "Creating limiter for key");
        let limiter = factory();
        entries.insert(key.to_string(), limiter.clone());
        limiter
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }
}

impl std::fmt::Debug for ShardedMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedMemoryBackend")
            .field("shards", &self.shards.len())
            .field("keys", &self.len())
            .finish()
    }
}

/// Backend built on [`DashMap`], which shards internally.
#[derive(Default)]
pub struct DashMapBackend {
    entries: DashMap<String, Arc<dyn Limiter>>,
}

impl DashMapBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LimiterBackend for DashMapBackend {
    fn load(&self, key: &str, factory: &dyn Fn() -> Arc<dyn Limiter>) -> Arc<dyn Limiter> {
        if let Some(entry) = self.entries.get(key) {
            return entry.value().clone();
        }

        // The entry guard holds the shard lock, so only one caller builds
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(key = %key, "Creating limiter for key");
                factory()
            })
            .value()
            .clone()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl std::fmt::Debug for DashMapBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashMapBackend")
            .field("keys", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    struct AlwaysAllow;

    impl Limiter for AlwaysAllow {
        fn allow(&self) -> bool {
            true
        }
    }

    fn backends() -> Vec<(&'static str, Arc<dyn LimiterBackend>)> {
        vec![
            ("sharded", Arc::new(ShardedMemoryBackend::new())),
            ("single-shard", Arc::new(ShardedMemoryBackend::with_shards(1))),
            ("dashmap", Arc::new(DashMapBackend::new())),
        ]
    }

    #[test]
    fn test_concurrent_first_access_constructs_once() {
        for (name, backend) in backends() {
            let constructed = Arc::new(AtomicUsize::new(0));
            let barrier = Arc::new(Barrier::new(16));
            let mut handles = vec![];

            for _ in 0..16 {
                let backend = backend.clone();
                let constructed = constructed.clone();
                let barrier = barrier.clone();
                handles.push(thread::spawn(move || {
                    barrier.wait();
                    backend.load("A", &|| {
                        constructed.fetch_add(1, Ordering::SeqCst);
                        // Widen the race window
                        thread::sleep(Duration::from_millis(5));
                        Arc::new(AlwaysAllow) as Arc<dyn Limiter>
                    })
                }));
            }

            let limiters: Vec<Arc<dyn Limiter>> =
                handles.into_iter().map(|h| h.join().unwrap()).collect();

            assert_eq!(constructed.load(Ordering::SeqCst), 1, "backend {}", name);
            assert!(
                limiters.iter().all(|l| Arc::ptr_eq(l, &limiters[0])),
                "backend {} returned different instances",
                name
            );
            assert_eq!(backend.len(), 1);
        }
    }

    #[test]
    fn test_distinct_keys_get_distinct_limiters() {
        for (name, backend) in backends() {
            let factory = || Arc::new(AlwaysAllow) as Arc<dyn Limiter>;

            let a = backend.load("route:/orders", &factory);
            let b = backend.load("client:42", &factory);
            let a_again = backend.load("route:/orders", &factory);

            assert!(!Arc::ptr_eq(&a, &b), "backend {}", name);
            assert!(Arc::ptr_eq(&a, &a_again), "backend {}", name);
            assert_eq!(backend.len(), 2);
        }
    }

    #[test]
    fn test_many_keys_spread_over_shards() {
        let backend = ShardedMemoryBackend::with_shards(8);
        let factory = || Arc::new(AlwaysAllow) as Arc<dyn Limiter>;

        for i in 0..200 {
            backend.load(&format!("client:{}", i), &factory);
        }

        assert_eq!(backend.len(), 200);
        let used = backend
            .shards
            .iter()
            .filter(|shard| !shard.read().is_empty())
            .count();
        assert!(used > 1);
    }

    #[test]
    fn test_zero_shards_clamped_to_one() {
        let backend = ShardedMemoryBackend::with_shards(0);
        assert_eq!(backend.shard_count(), 1);
        assert!(backend.is_empty());
    }
}
