//! Error types for Gatekeeper.

use thiserror::Error;

/// Main error type for Gatekeeper operations.
///
/// The limiter core itself only ever answers `true`/`false`; these errors live
/// at the gateway boundary, where a rejection has to be reported to a caller.
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The route-wide limiter rejected the request
    #[error("Endpoint rate limit exceeded")]
    RouteLimited,

    /// The per-client limiter rejected the request
    #[error("Endpoint(By Client) rate limit exceeded")]
    ClientLimited,

    /// The backend call limiter rejected the call
    #[error("Proxy(Backend) rate limit exceeded")]
    ProxyLimited,

    /// A backend failed to produce a response
    #[error("Backend error: {0}")]
    Backend(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatekeeperError {
    /// Whether this error is a rate limit rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            GatekeeperError::RouteLimited
                | GatekeeperError::ClientLimited
                | GatekeeperError::ProxyLimited
        )
    }

    /// HTTP status the surrounding gateway should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            GatekeeperError::RouteLimited
            | GatekeeperError::ClientLimited
            | GatekeeperError::ProxyLimited => 503,
            GatekeeperError::Backend(_) => 502,
            GatekeeperError::Config(_) | GatekeeperError::Io(_) => 500,
        }
    }
}

/// Result type alias for Gatekeeper operations.
pub type Result<T> = std::result::Result<T, GatekeeperError>;
