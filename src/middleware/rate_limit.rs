//! Per-client rate limiting middleware using the Governor crate

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::{
    num::NonZeroU32,
    sync::atomic::{AtomicU64, Ordering},
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::warn;

use crate::error::GatewayError;
use crate::gateway::dispatcher::client_address;

type SharedRateLimiter = Arc<DefaultKeyedRateLimiter<String>>;

/// Forget idle client buckets every this many requests
const PRUNE_EVERY: u64 = 4096;

const DEFAULT_RPS: NonZeroU32 = match NonZeroU32::new(100) {
    Some(n) => n,
    None => panic!("default rate must be non-zero"),
};

/// Rate limiting layer, one bucket per client address
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: SharedRateLimiter,
    exempt_paths: Arc<Vec<String>>,
    seen: Arc<AtomicU64>,
}

impl RateLimitLayer {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(DEFAULT_RPS);
        let burst = NonZeroU32::new(burst_size).unwrap_or(rps);
        let quota = Quota::per_second(rps).allow_burst(burst);

        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            exempt_paths: Arc::new(Vec::new()),
            seen: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Requests whose path equals one of these are never limited
    pub fn exempt(mut self, paths: &[&str]) -> Self {
        self.exempt_paths = Arc::new(paths.iter().map(|p| p.to_string()).collect());
        self
    }
}

fn is_exempt(exempt_paths: &[String], path: &str) -> bool {
    exempt_paths.iter().any(|p| p.as_str() == path)
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: self.limiter.clone(),
            exempt_paths: self.exempt_paths.clone(),
            seen: self.seen.clone(),
        }
    }
}

/// Rate limiting middleware service
#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: SharedRateLimiter,
    exempt_paths: Arc<Vec<String>>,
    seen: Arc<AtomicU64>,
}

impl<S> Service<Request<Body>> for RateLimitMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let path = request.uri().path();
        if is_exempt(&self.exempt_paths, path) {
            let future = self.inner.call(request);
            return Box::pin(async move { future.await });
        }

        if self.seen.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.limiter.retain_recent();
        }

        let client = client_address(&request);
        match self.limiter.check_key(&client) {
            Ok(_) => {
                let future = self.inner.call(request);
                Box::pin(async move { future.await })
            }
            Err(_) => {
                warn!(client = %client, "Rate limit exceeded");
                Box::pin(async move { Ok(GatewayError::RateLimitExceeded.into_response()) })
            }
        }
    }
}
