//! Configuration management for Gatekeeper.
//!
//! Rate limits are attached to endpoints and backends as a middleware block
//! under the [`MW_NAMESPACE`] key:
//!
//! ```yaml
//! endpoints:
//!   - endpoint: /orders
//!     middleware:
//!       mw-ratelimit:
//!         max_rate: 100
//!         client_max_rate: 10
//!     backends:
//!       - url_pattern: /inventory
//!         middleware:
//!           mw-ratelimit:
//!             max_rate: 50
//!             fill_interval: 200
//!             fill_count: 5
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{GatekeeperError, Result};
use crate::ratelimit::BucketConfig;

/// Middleware key holding rate limit settings.
pub const MW_NAMESPACE: &str = "mw-ratelimit";

/// Raw middleware settings keyed by namespace.
pub type MiddlewareConfig = HashMap<String, serde_yaml::Value>;

/// Rate limit settings for an endpoint or backend.
///
/// A rate of zero or less disables the corresponding limiter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket capacity for the route or backend
    #[serde(default)]
    pub max_rate: i64,

    /// Bucket capacity per client (endpoints only)
    #[serde(default)]
    pub client_max_rate: i64,

    /// Refill period in milliseconds (0 uses the default)
    #[serde(default)]
    pub fill_interval: u64,

    /// Tokens added per refill (0 uses the default)
    #[serde(default)]
    pub fill_count: u64,
}

impl RateLimitConfig {
    /// Extract the rate limit block from middleware settings.
    ///
    /// Returns `None` when the block is missing or cannot be decoded.
    pub fn from_middleware(middleware: &MiddlewareConfig) -> Option<Self> {
        let raw = middleware.get(MW_NAMESPACE)?;
        match serde_yaml::from_value(raw.clone()) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(namespace = MW_NAMESPACE, error = %e, "Ignoring invalid rate limit config");
                None
            }
        }
    }

    /// Bucket shape for the route or backend limiter, if enabled.
    pub fn bucket_config(&self) -> Option<BucketConfig> {
        self.bucket_for(self.max_rate)
    }

    /// Bucket shape for per-client limiters, if enabled.
    pub fn client_bucket_config(&self) -> Option<BucketConfig> {
        self.bucket_for(self.client_max_rate)
    }

    fn bucket_for(&self, rate: i64) -> Option<BucketConfig> {
        if rate <= 0 {
            return None;
        }
        Some(BucketConfig::from_millis(
            rate as u64,
            self.fill_interval,
            self.fill_count,
        ))
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Name used in logs
    #[serde(default = "default_name")]
    pub name: String,

    /// Endpoints exposed by the gateway
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            endpoints: Vec::new(),
        }
    }
}

fn default_name() -> String {
    "gatekeeper".to_string()
}

/// A gateway endpoint and the backends it fans out to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Route path, e.g. `/orders`
    pub endpoint: String,

    #[serde(default)]
    pub middleware: MiddlewareConfig,

    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

/// A backend called by an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url_pattern: String,

    #[serde(default)]
    pub middleware: MiddlewareConfig,
}

impl GatewayConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading gateway configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GatewayConfig = serde_yaml::from_str(yaml)
            .map_err(|e| GatekeeperError::Config(format!("Failed to parse gateway config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for endpoint in &self.endpoints {
            if !endpoint.endpoint.starts_with('/') {
                return Err(GatekeeperError::Config(format!(
                    "endpoint '{}' must start with '/'",
                    endpoint.endpoint
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn middleware(yaml: &str) -> MiddlewareConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_parse_rate_limit_block() {
        let mw = middleware(
            r#"
mw-ratelimit:
  max_rate: 10
  fill_interval: 250
  fill_count: 3
"#,
        );

        let config = RateLimitConfig::from_middleware(&mw).unwrap();
        assert_eq!(config.max_rate, 10);
        assert_eq!(config.client_max_rate, 0);

        let bucket = config.bucket_config().unwrap();
        assert_eq!(bucket.capacity, 10);
        assert_eq!(bucket.fill_interval, Duration::from_millis(250));
        assert_eq!(bucket.fill_count, 3);
        assert!(config.client_bucket_config().is_none());
    }

    #[test]
    fn test_missing_block_yields_none() {
        let mw = middleware("mw-cors:\n  allow_origins: ['*']\n");
        assert!(RateLimitConfig::from_middleware(&mw).is_none());
    }

    #[test]
    fn test_invalid_block_yields_none() {
        let mw = middleware("mw-ratelimit:\n  max_rate: lots\n");
        assert!(RateLimitConfig::from_middleware(&mw).is_none());
    }

    #[test]
    fn test_non_positive_rate_disables() {
        let config = RateLimitConfig {
            max_rate: 0,
            client_max_rate: -1,
            ..Default::default()
        };
        assert!(config.bucket_config().is_none());
        assert!(config.client_bucket_config().is_none());
    }

    #[test]
    fn test_fill_defaults_applied() {
        let config = RateLimitConfig {
            max_rate: 5,
            ..Default::default()
        };
        let bucket = config.bucket_config().unwrap();
        assert_eq!(bucket.fill_interval, Duration::from_millis(100));
        assert_eq!(bucket.fill_count, 2);
    }

    #[test]
    fn test_parse_gateway_config() {
        let yaml = r#"
name: edge
endpoints:
  - endpoint: /orders
    middleware:
      mw-ratelimit:
        max_rate: 100
        client_max_rate: 10
    backends:
      - url_pattern: /inventory
        middleware:
          mw-ratelimit:
            max_rate: 50
      - url_pattern: /pricing
"#;
        let config = GatewayConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name, "edge");
        assert_eq!(config.endpoints.len(), 1);

        let endpoint = &config.endpoints[0];
        let limits = RateLimitConfig::from_middleware(&endpoint.middleware).unwrap();
        assert_eq!(limits.max_rate, 100);
        assert_eq!(limits.client_max_rate, 10);

        assert_eq!(endpoint.backends.len(), 2);
        assert!(RateLimitConfig::from_middleware(&endpoint.backends[1].middleware).is_none());
    }

    #[test]
    fn test_gateway_config_defaults() {
        let config = GatewayConfig::from_yaml("{}").unwrap();
        assert_eq!(config.name, "gatekeeper");
        assert!(config.endpoints.is_empty());
    }

    #[test]
    fn test_relative_endpoint_rejected() {
        let yaml = "endpoints:\n  - endpoint: orders\n";
        let err = GatewayConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, GatekeeperError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = GatewayConfig::from_file("/nonexistent/gatekeeper.yaml").unwrap_err();
        assert!(matches!(err, GatekeeperError::Io(_)));
    }
}
