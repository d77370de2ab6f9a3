//! Gateway dispatcher: route resolution, auth gate, forwarding and relay

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures::FutureExt;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

use crate::audit::{AuditRecord, AuditSink};
use crate::backend::traits::{ForwardRequest, Upstream, UpstreamResponse};
use crate::error::{panic_message, GatewayError, Result};
use crate::gateway::router::SharedRouteTable;
use crate::middleware::auth::AuthGate;

/// Connection-scoped headers that are never forwarded in either direction
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// What the audit record of a failed dispatch needs to know
#[derive(Debug, Default)]
struct DispatchTrace {
    actor: Option<String>,
    cluster: Option<String>,
}

/// Entry point for every proxied request.
///
/// Sequence: resolve the route (404), run the auth gate unless the route is
/// public (401/403), forward to one destination of the route's cluster, and
/// relay the backend's status, headers and body. Forwarding is never attempted
/// for a request that failed resolution or authentication.
pub struct Dispatcher {
    routes: Arc<SharedRouteTable>,
    auth: Arc<AuthGate>,
    upstream: Arc<dyn Upstream>,
    audit: Arc<dyn AuditSink>,
    max_body_bytes: usize,
}

impl Dispatcher {
    pub fn new(
        routes: Arc<SharedRouteTable>,
        auth: Arc<AuthGate>,
        upstream: Arc<dyn Upstream>,
        audit: Arc<dyn AuditSink>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            routes,
            auth,
            upstream,
            audit,
            max_body_bytes,
        }
    }

    /// Handle one request, always producing a well-formed response
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let requester = client_address(&request);
        let mut trace = DispatchTrace::default();

        let outcome = AssertUnwindSafe(self.dispatch(request, &requester, &mut trace))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(GatewayError::Internal(panic_message(payload.as_ref()))));

        match outcome {
            Ok(response) => response,
            Err(err) => {
                let status = err.status_code();
                if status.is_server_error() {
                    error!(method = %method, path = %path, error = %err, "Dispatch failed");
                } else {
                    debug!(method = %method, path = %path, status = %status, "Request rejected");
                }

                if matches!(err, GatewayError::Unauthenticated(_) | GatewayError::Forbidden(_))
                    || status.is_server_error()
                {
                    self.audit.record(AuditRecord {
                        actor: trace.actor,
                        action_type: format!("{} {}", method, path),
                        entity: trace.cluster.unwrap_or_else(|| "gateway".to_string()),
                        success: false,
                        error: Some(err.to_string()),
                        requester_address: requester,
                        timestamp: Utc::now(),
                    });
                }

                err.into_response()
            }
        }
    }

    async fn dispatch(
        &self,
        request: Request<Body>,
        requester: &str,
        trace: &mut DispatchTrace,
    ) -> Result<Response> {
        let resolved = self.routes.resolve(request.uri().path())?;
        trace.cluster = Some(resolved.cluster.id().to_string());

        if !resolved.route.public {
            let context = self.auth.authenticate(request.headers())?;
            trace.actor = Some(context.subject.clone());
            self.auth.authorize(&context, &resolved.route.required_roles)?;
        }

        let (parts, body) = request.into_parts();
        if let Some(length) = content_length(&parts.headers) {
            if length > self.max_body_bytes {
                return Err(GatewayError::PayloadTooLarge(self.max_body_bytes));
            }
        }
        let body = to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|_| GatewayError::PayloadTooLarge(self.max_body_bytes))?;

        let headers = forward_headers(&parts.headers, requester, &resolved.route.prefix);
        let forward = ForwardRequest {
            method: parts.method,
            path: resolved.residual_path,
            query: parts.uri.query().map(str::to_string),
            headers,
            body,
        };

        let upstream_response = self.upstream.forward(&resolved.cluster, forward).await?;
        Ok(relay(upstream_response))
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Headers sent upstream: everything except `Host`, `Content-Length` and
/// hop-by-hop headers, plus the `X-Forwarded-*` set.
pub fn forward_headers(incoming: &HeaderMap, requester: &str, prefix: &str) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(incoming.len() + 4);
    for (name, value) in incoming {
        if name == header::HOST || name == header::CONTENT_LENGTH || is_hop_by_hop(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let forwarded_for = match incoming.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{}, {}", existing, requester),
        None => requester.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert(HeaderName::from_static("x-forwarded-for"), value);
    }
    if let Some(host) = incoming.get(header::HOST) {
        headers.insert(HeaderName::from_static("x-forwarded-host"), host.clone());
    }
    if !headers.contains_key("x-forwarded-proto") {
        headers.insert(HeaderName::from_static("x-forwarded-proto"), HeaderValue::from_static("http"));
    }
    if prefix != "/" {
        if let Ok(value) = HeaderValue::from_str(prefix) {
            headers.insert(HeaderName::from_static("x-forwarded-prefix"), value);
        }
    }

    headers
}

/// Build the caller's response from the backend's, dropping hop-by-hop headers
fn relay(upstream: UpstreamResponse) -> Response {
    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = upstream.status;

    let headers = response.headers_mut();
    for (name, value) in &upstream.headers {
        if !is_hop_by_hop(name) {
            headers.append(name.clone(), value.clone());
        }
    }

    response
}

/// Caller address from the connection, falling back to `X-Forwarded-For`
pub fn client_address<B>(request: &Request<B>) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
