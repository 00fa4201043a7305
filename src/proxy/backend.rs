//! Rate limiting for backend calls.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Proxy, Request, Response};
use crate::config::{BackendConfig, RateLimitConfig};
use crate::error::{GatekeeperError, Result};
use crate::ratelimit::{Limiter, RateLimiter};

/// Proxy step that consults a limiter before forwarding to the next step.
pub struct RateLimitedProxy {
    limiter: Arc<dyn Limiter>,
    next: Arc<dyn Proxy>,
}

impl RateLimitedProxy {
    pub fn new(limiter: Arc<dyn Limiter>, next: Arc<dyn Proxy>) -> Self {
        Self { limiter, next }
    }
}

#[async_trait]
impl Proxy for RateLimitedProxy {
    async fn call(&self, request: Request) -> Result<Response> {
        if !self.limiter.allow() {
            warn!(path = %request.path, "Backend rate limit exceeded, call stopped");
            return Err(GatekeeperError::ProxyLimited);
        }

        debug!(path = %request.path, "Backend rate limit passed");
        self.next.call(request).await
    }
}

/// Put a rate limiter in front of `next` according to the backend's middleware.
///
/// When the backend has no rate limit block, or its `max_rate` is zero or
/// less, `next` is returned unchanged.
pub fn backend_limiter(config: &BackendConfig, next: Arc<dyn Proxy>) -> Arc<dyn Proxy> {
    let bucket = RateLimitConfig::from_middleware(&config.middleware)
        .and_then(|limits| limits.bucket_config());

    let Some(bucket) = bucket else {
        debug!(backend = %config.url_pattern, "No backend rate limit configured");
        return next;
    };

    debug!(
        backend = %config.url_pattern,
        max_rate = bucket.capacity,
        fill_interval_ms = bucket.fill_interval.as_millis() as u64,
        fill_count = bucket.fill_count,
        "Backend rate limit enabled"
    );
    Arc::new(RateLimitedProxy::new(
        Arc::new(RateLimiter::new(bucket)),
        next,
    ))
}

/// Wrap a backend factory so every backend it builds is rate limited.
pub fn backend_factory<F>(next: F) -> impl Fn(&BackendConfig) -> Arc<dyn Proxy>
where
    F: Fn(&BackendConfig) -> Arc<dyn Proxy>,
{
    move |config| backend_limiter(config, next(config))
}
