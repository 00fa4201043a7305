//! Gateway call-chain integration.
//!
//! Three independent limiters can reject a request: the route-wide limiter and
//! the per-client limiter of an endpoint ([`EndpointLimiter`]), and the limiter
//! in front of each backend call ([`RateLimitedProxy`]).

mod backend;
mod endpoint;

pub use backend::{backend_factory, backend_limiter, RateLimitedProxy};
pub use endpoint::EndpointLimiter;

use async_trait::async_trait;

use crate::error::Result;

/// A request travelling through the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Path of the call
    pub path: String,
    /// Client identity used for per-client limiting, if known
    pub client: Option<String>,
}

impl Request {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            client: None,
        }
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }
}

/// A backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

/// One step of a backend call chain.
#[async_trait]
pub trait Proxy: Send + Sync {
    async fn call(&self, request: Request) -> Result<Response>;
}

/// Backend that answers every call in-process with the backend name and path.
#[derive(Debug, Clone)]
pub struct EchoProxy {
    name: String,
}

impl EchoProxy {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Proxy for EchoProxy {
    async fn call(&self, request: Request) -> Result<Response> {
        Ok(Response {
            status: 200,
            body: format!("{} {}", self.name, request.path),
        })
    }
}
