//! Self-refilling token bucket.
//!
//! A bucket holds up to `capacity` tokens. A dedicated background thread adds
//! `fill_count` tokens every `fill_interval`, clamped to the capacity. The
//! token count, the refill logic and the wait condition all share one mutex,
//! so refills and acquisitions on a bucket are strictly serialized.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::atomic::{AtomicInteger, Bool, Uint64};

/// Refill period used when none is configured.
pub const DEFAULT_FILL_INTERVAL: Duration = Duration::from_millis(100);
/// Tokens added per refill when none is configured.
pub const DEFAULT_FILL_COUNT: u64 = 2;

/// Shape of a token bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketConfig {
    /// Maximum number of tokens held
    pub capacity: u64,
    /// Time between refills
    pub fill_interval: Duration,
    /// Tokens added per refill
    pub fill_count: u64,
}

impl BucketConfig {
    /// Create a configuration, substituting defaults for a zero interval or count.
    pub fn new(capacity: u64, fill_interval: Duration, fill_count: u64) -> Self {
        Self {
            capacity,
            fill_interval,
            fill_count,
        }
        .normalized()
    }

    /// Same as [`BucketConfig::new`] with the interval given in milliseconds.
    pub fn from_millis(capacity: u64, fill_interval_ms: u64, fill_count: u64) -> Self {
        Self::new(capacity, Duration::from_millis(fill_interval_ms), fill_count)
    }

    fn normalized(mut self) -> Self {
        if self.fill_interval.is_zero() {
            self.fill_interval = DEFAULT_FILL_INTERVAL;
        }
        if self.fill_count == 0 {
            self.fill_count = DEFAULT_FILL_COUNT;
        }
        self
    }
}

/// Snapshot of a bucket's decision counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketStats {
    /// Successful acquisitions, blocking or not
    pub acquired: u64,
    /// Failed acquisitions, including infeasible requests
    pub rejected: u64,
}

struct BucketState {
    available: u64,
}

/// State shared between the bucket handle and its refill thread.
struct Shared {
    config: BucketConfig,
    state: Mutex<BucketState>,
    /// Signalled after every refill and on disposal.
    tokens_ready: Condvar,
    /// Wakes the refill thread early on disposal.
    tick: Condvar,
    disposed: Bool,
    acquired: Uint64,
    rejected: Uint64,
}

impl Shared {
    fn feasible(&self, num: u64) -> bool {
        num <= self.config.capacity
    }

    /// Add one refill worth of tokens. Must be called with the state lock held.
    fn fill(&self, state: &mut BucketState) -> bool {
        if state.available >= self.config.capacity {
            return false;
        }

        state.available = state
            .available
            .saturating_add(self.config.fill_count)
            .min(self.config.capacity);
        self.tokens_ready.notify_all();
        true
    }
}

/// Token bucket rate limiter for a single key.
///
/// The bucket starts full and spawns exactly one refill thread at
/// construction. The thread runs until [`TokenBucket::dispose`] is called or
/// the bucket is dropped.
pub struct TokenBucket {
    shared: Arc<Shared>,
    refill: Mutex<Option<JoinHandle<()>>>,
}

impl TokenBucket {
    /// Create a bucket with `capacity` tokens refilled by `fill_count` every `fill_interval`.
    ///
    /// A zero interval or count is replaced by [`DEFAULT_FILL_INTERVAL`] or
    /// [`DEFAULT_FILL_COUNT`]. Panics like [`TokenBucket::with_config`].
    pub fn new(capacity: u64, fill_interval: Duration, fill_count: u64) -> Self {
        Self::with_config(BucketConfig::new(capacity, fill_interval, fill_count))
    }

    /// Create a bucket from a configuration.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to spawn the refill thread.
    pub fn with_config(config: BucketConfig) -> Self {
        let bucket = Self::detached(config);
        let shared = bucket.shared.clone();

        let handle = thread::Builder::new()
            .name("gatekeeper-refill".to_string())
            .spawn(move || refill_loop(shared))
            .expect("Failed to spawn refill thread");
        *bucket.refill.lock() = Some(handle);

        bucket
    }

    /// Build a bucket without a refill thread.
    pub(crate) fn detached(config: BucketConfig) -> Self {
        let config = config.normalized();

        debug!(
            capacity = config.capacity,
            fill_interval_ms = config.fill_interval.as_millis() as u64,
            fill_count = config.fill_count,
            "Creating token bucket"
        );

        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(BucketState {
                    available: config.capacity,
                }),
                tokens_ready: Condvar::new(),
                tick: Condvar::new(),
                disposed: Bool::new(false),
                acquired: Uint64::default(),
                rejected: Uint64::default(),
            }),
            refill: Mutex::new(None),
        }
    }

    /// Try to take one token without blocking.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_n(1)
    }

    /// Try to take `num` tokens without blocking.
    ///
    /// Returns `false` right away when `num` exceeds the capacity or when
    /// fewer than `num` tokens are available. A failed call leaves the token
    /// count untouched.
    pub fn try_acquire_n(&self, num: u64) -> bool {
        let shared = &self.shared;
        if !shared.feasible(num) {
            shared.rejected.increment();
            return false;
        }

        let mut state = shared.state.lock();
        if state.available >= num {
            state.available -= num;
            drop(state);
            shared.acquired.increment();
            return true;
        }
        drop(state);

        shared.rejected.increment();
        false
    }

    /// Block until one token is available and take it.
    pub fn wait_until_acquire(&self) -> bool {
        self.wait_until_acquire_n(1)
    }

    /// Block until `num` tokens are available and take them.
    ///
    /// Returns `false` immediately when `num` exceeds the capacity. There is no
    /// timeout: the call only returns once refills supply the tokens, or with
    /// `false` when the bucket is disposed while the caller waits.
    pub fn wait_until_acquire_n(&self, num: u64) -> bool {
        let shared = &self.shared;
        if !shared.feasible(num) {
            shared.rejected.increment();
            return false;
        }

        let mut state = shared.state.lock();
        loop {
            if state.available >= num {
                state.available -= num;
                drop(state);
                shared.acquired.increment();
                return true;
            }

            if shared.disposed.load() {
                drop(state);
                trace!(requested = num, "Bucket disposed while waiting for tokens");
                shared.rejected.increment();
                return false;
            }

            shared.tokens_ready.wait(&mut state);
        }
    }

    /// Stop refilling the bucket.
    ///
    /// Wakes the refill thread and every caller blocked in
    /// [`TokenBucket::wait_until_acquire_n`], then waits for the refill thread
    /// to exit. Calling it more than once is harmless.
    pub fn dispose(&self) {
        {
            let _state = self.shared.state.lock();
            if self.shared.disposed.swap(true) {
                return;
            }
            self.shared.tick.notify_all();
            self.shared.tokens_ready.notify_all();
        }

        if let Some(handle) = self.refill.lock().take() {
            if handle.join().is_err() {
                warn!("Refill thread panicked");
            }
        }
    }

    /// Whether [`TokenBucket::dispose`] has been called.
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load()
    }

    /// Tokens currently available.
    pub fn available(&self) -> u64 {
        self.shared.state.lock().available
    }

    /// Maximum number of tokens held.
    pub fn capacity(&self) -> u64 {
        self.shared.config.capacity
    }

    /// Time between refills.
    pub fn fill_interval(&self) -> Duration {
        self.shared.config.fill_interval
    }

    /// Tokens added per refill.
    pub fn fill_count(&self) -> u64 {
        self.shared.config.fill_count
    }

    /// Normalized configuration of this bucket.
    pub fn config(&self) -> BucketConfig {
        self.shared.config
    }

    /// Decision counters since construction.
    pub fn stats(&self) -> BucketStats {
        BucketStats {
            acquired: self.shared.acquired.load(),
            rejected: self.shared.rejected.load(),
        }
    }

    /// Run one refill step synchronously.
    #[cfg(test)]
    pub(crate) fn refill_now(&self) -> bool {
        let mut state = self.shared.state.lock();
        self.shared.fill(&mut state)
    }
}

impl Drop for TokenBucket {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("config", &self.shared.config)
            .field("available", &self.available())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Body of the refill thread.
///
/// Missed ticks are dropped rather than replayed, so a stalled thread never
/// refills in bursts.
fn refill_loop(shared: Arc<Shared>) {
    let interval = shared.config.fill_interval;
    debug!(
        fill_interval_ms = interval.as_millis() as u64,
        fill_count = shared.config.fill_count,
        "Refill thread started"
    );

    // `None` means the interval is too long to schedule: the bucket never ticks
    let mut next_tick = Instant::now().checked_add(interval);
    loop {
        let mut state = shared.state.lock();
        match next_tick {
            Some(deadline) => {
                while !shared.disposed.load() && Instant::now() < deadline {
                    shared.tick.wait_until(&mut state, deadline);
                }
            }
            None => {
                while !shared.disposed.load() {
                    shared.tick.wait(&mut state);
                }
            }
        }

        if shared.disposed.load() {
            break;
        }

        if shared.fill(&mut state) {
            trace!(available = state.available, "Bucket refilled");
        }
        drop(state);

        let now = Instant::now();
        next_tick = match next_tick.and_then(|tick| tick.checked_add(interval)) {
            Some(tick) if tick > now => Some(tick),
            _ => now.checked_add(interval),
        };
    }

    debug!("Refill thread stopped");
}
