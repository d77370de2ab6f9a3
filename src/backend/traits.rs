//! Common traits and types for forwarding requests to backend clusters

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};

use crate::error::Result;
use crate::gateway::router::Cluster;

/// A request ready to be sent to some destination of a cluster
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Residual path, always starting with '/'
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ForwardRequest {
    /// Absolute URL of this request at `destination`
    pub fn url_for(&self, destination: &str) -> String {
        match &self.query {
            Some(query) => format!("{}{}?{}", destination, self.path, query),
            None => format!("{}{}", destination, self.path),
        }
    }

    /// Methods that may be retried without side effects
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::OPTIONS | Method::PUT | Method::DELETE | Method::TRACE
        )
    }
}

/// Backend response relayed to the caller
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Transport that delivers a request to one destination of a cluster
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Forward the request. Connection failures map to `BackendUnavailable`,
    /// timeouts to `BackendTimeout`.
    async fn forward(&self, cluster: &Cluster, request: ForwardRequest) -> Result<UpstreamResponse>;
}
