//! Route and per-client limiting for gateway endpoints.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::Request;
use crate::config::{EndpointConfig, RateLimitConfig};
use crate::error::{GatekeeperError, Result};
use crate::ratelimit::{Limiter, LimiterStore, RateLimiter, ShardedMemoryBackend};

/// Limiters guarding one endpoint.
///
/// The route limiter is shared by every caller of the endpoint. The client
/// store keeps a separate bucket per client identity; requests without a
/// client identity skip it.
#[derive(Debug)]
pub struct EndpointLimiter {
    endpoint: String,
    route: Option<RateLimiter>,
    clients: Option<LimiterStore>,
}

impl EndpointLimiter {
    /// Build the limiters enabled by `config`.
    pub fn new(endpoint: impl Into<String>, config: &RateLimitConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            route: config.bucket_config().map(RateLimiter::new),
            clients: config.client_bucket_config().map(|bucket| {
                LimiterStore::with_config(bucket, Arc::new(ShardedMemoryBackend::new()))
            }),
        }
    }

    /// Build the limiters for an endpoint from its middleware settings.
    ///
    /// Returns `None` when neither the route nor the client limit is enabled.
    pub fn from_config(config: &EndpointConfig) -> Option<Self> {
        let limits = RateLimitConfig::from_middleware(&config.middleware)?;
        let limiter = Self::new(config.endpoint.clone(), &limits);
        if limiter.route.is_none() && limiter.clients.is_none() {
            debug!(endpoint = %config.endpoint, "Endpoint rate limits disabled");
            return None;
        }
        Some(limiter)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Admit or reject `request`.
    ///
    /// The route limit is checked first, so a request rejected there does
    /// not spend a client token.
    pub fn check(&self, request: &Request) -> Result<()> {
        if let Some(route) = &self.route {
            if !route.allow() {
                warn!(endpoint = %self.endpoint, path = %request.path, "Endpoint rate limit exceeded");
                return Err(GatekeeperError::RouteLimited);
            }
        }

        if let (Some(clients), Some(client)) = (&self.clients, request.client.as_deref()) {
            if !clients.allow(client) {
                warn!(
                    endpoint = %self.endpoint,
                    client = %client,
                    "Endpoint rate limit exceeded for client"
                );
                return Err(GatekeeperError::ClientLimited);
            }
        }

        trace!(endpoint = %self.endpoint, path = %request.path, "Request admitted");
        Ok(())
    }

    /// Number of clients seen by the per-client limiter.
    pub fn tracked_clients(&self) -> usize {
        self.clients.as_ref().map_or(0, |clients| clients.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limits(max_rate: i64, client_max_rate: i64) -> RateLimitConfig {
        RateLimitConfig {
            max_rate,
            client_max_rate,
            fill_interval: 60_000,
            fill_count: 1,
        }
    }

    #[test]
    fn test_route_limit_applies_to_all_clients() {
        let limiter = EndpointLimiter::new("/orders", &limits(2, 0));

        assert!(limiter.check(&Request::new("/orders").with_client("a")).is_ok());
        assert!(limiter.check(&Request::new("/orders").with_client("b")).is_ok());

        let err = limiter
            .check(&Request::new("/orders").with_client("c"))
            .unwrap_err();
        assert!(matches!(err, GatekeeperError::RouteLimited));
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_client_limit_is_per_client() {
        let limiter = EndpointLimiter::new("/orders", &limits(0, 1));

        assert!(limiter.check(&Request::new("/orders").with_client("a")).is_ok());
        let err = limiter
            .check(&Request::new("/orders").with_client("a"))
            .unwrap_err();
        assert!(matches!(err, GatekeeperError::ClientLimited));

        assert!(limiter.check(&Request::new("/orders").with_client("b")).is_ok());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_anonymous_requests_skip_client_limit() {
        let limiter = EndpointLimiter::new("/orders", &limits(0, 1));

        for _ in 0..5 {
            assert!(limiter.check(&Request::new("/orders")).is_ok());
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_route_rejection_does_not_spend_client_token() {
        let limiter = EndpointLimiter::new("/orders", &limits(1, 1));

        assert!(limiter.check(&Request::new("/orders").with_client("b")).is_ok());
        let err = limiter
            .check(&Request::new("/orders").with_client("a"))
            .unwrap_err();
        assert!(matches!(err, GatekeeperError::RouteLimited));

        // Client "a" never reached its own bucket
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_from_config_disabled() {
        let config: EndpointConfig = serde_yaml::from_str(
            r#"
endpoint: /orders
middleware:
  mw-ratelimit:
    max_rate: 0
"#,
        )
        .unwrap();
        assert!(EndpointLimiter::from_config(&config).is_none());

        let config: EndpointConfig = serde_yaml::from_str("endpoint: /orders\n").unwrap();
        assert!(EndpointLimiter::from_config(&config).is_none());
    }

    #[test]
    fn test_from_config_enabled() {
        let config: EndpointConfig = serde_yaml::from_str(
            r#"
endpoint: /orders
middleware:
  mw-ratelimit:
    client_max_rate: 3
"#,
        )
        .unwrap();

        let limiter = EndpointLimiter::from_config(&config).unwrap();
        assert_eq!(limiter.endpoint(), "/orders");
        assert!(limiter.check(&Request::new("/orders").with_client("x")).is_ok());
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_client_store_keeps_configured_bucket_shape() {
        let config = RateLimitConfig {
            max_rate: 0,
            client_max_rate: 4,
            fill_interval: u64::MAX,
            fill_count: 3,
        };
        let limiter = EndpointLimiter::new("/orders", &config);

        let clients = limiter.clients.as_ref().unwrap();
        assert_eq!(Some(clients.config()), config.client_bucket_config());
        assert_eq!(clients.config().fill_interval, Duration::from_millis(u64::MAX));

        // A client bucket with an unschedulable interval still serves its tokens
        for _ in 0..4 {
            assert!(limiter.check(&Request::new("/orders").with_client("a")).is_ok());
        }
        assert!(limiter.check(&Request::new("/orders").with_client("a")).is_err());
    }
}
