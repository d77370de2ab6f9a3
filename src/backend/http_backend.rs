//! HTTP upstream client implementation

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::traits::{ForwardRequest, Upstream, UpstreamResponse};
use crate::config::ProxyConfig;
use crate::error::{GatewayError, Result};
use crate::gateway::router::Cluster;

/// Forwards requests over HTTP with a bounded timeout.
///
/// A single attempt is made by default. With `retries > 0`, idempotent
/// requests that fail to connect are retried against the cluster's next
/// destination, up to `retries` extra attempts.
pub struct HttpUpstream {
    client: Client,
    retries: u32,
}

impl HttpUpstream {
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retries: config.retries,
        })
    }
}

fn classify(url: &str, error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::BackendTimeout(url.to_string())
    } else {
        GatewayError::BackendUnavailable(format!("{}: {}", url, error))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn forward(&self, cluster: &Cluster, request: ForwardRequest) -> Result<UpstreamResponse> {
        let attempts = if request.is_idempotent() { self.retries + 1 } else { 1 };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let destination = cluster.next_destination()?;
            let url = request.url_for(destination);

            debug!(
                cluster = %cluster.id(),
                method = %request.method,
                url = %url,
                attempt = attempt,
                "Forwarding request"
            );

            let result = self
                .client
                .request(request.method.clone(), &url)
                .headers(request.headers.clone())
                .body(request.body.clone())
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();
                    let body = response.bytes().await.map_err(|e| classify(&url, e))?;
                    return Ok(UpstreamResponse { status, headers, body });
                }
                Err(e) if e.is_connect() && !e.is_timeout() && attempt < attempts => {
                    warn!(cluster = %cluster.id(), url = %url, error = %e, "Connection failed, retrying");
                }
                Err(e) => {
                    warn!(cluster = %cluster.id(), url = %url, error = %e, "Forwarding failed");
                    return Err(classify(&url, e));
                }
            }
        }
    }
}
