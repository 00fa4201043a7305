//! Limiter capability and its token bucket implementation.

use std::sync::Arc;
use std::time::Duration;

use super::bucket::{BucketConfig, TokenBucket};

/// Admission decision for a single key.
///
/// Rejection is a plain `false`; callers decide how to report it.
pub trait Limiter: Send + Sync {
    /// Whether one more unit of work may proceed now.
    fn allow(&self) -> bool;
}

/// [`Limiter`] backed by a [`TokenBucket`].
///
/// Cloning is cheap and every clone shares the same bucket.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    bucket: Arc<TokenBucket>,
}

impl RateLimiter {
    /// Create a limiter with its own bucket.
    pub fn new(config: BucketConfig) -> Self {
        Self {
            bucket: Arc::new(TokenBucket::with_config(config)),
        }
    }

    /// Create a limiter allowing `max_rate` tokens, refilled by `fill_count`
    /// every `fill_interval_ms` milliseconds.
    pub fn with_rate(max_rate: u64, fill_interval_ms: u64, fill_count: u64) -> Self {
        Self::new(BucketConfig::new(
            max_rate,
            Duration::from_millis(fill_interval_ms),
            fill_count,
        ))
    }

    /// The bucket behind this limiter.
    pub fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }
}

impl Limiter for RateLimiter {
    fn allow(&self) -> bool {
        self.bucket.try_acquire()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_consumes_one_token() {
        let limiter = RateLimiter::with_rate(3, 60_000, 1);

        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
        assert_eq!(limiter.bucket().available(), 0);
    }

    #[test]
    fn test_clones_share_bucket() {
        let limiter = RateLimiter::with_rate(2, 60_000, 1);
        let clone = limiter.clone();

        assert!(limiter.allow());
        assert!(clone.allow());
        assert!(!limiter.allow());
    }

    #[test]
    fn test_zero_rate_never_allows() {
        let limiter = RateLimiter::with_rate(0, 0, 0);
        assert!(!limiter.allow());
    }
}
