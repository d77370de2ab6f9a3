//! Router construction

use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::error;

use crate::api::handlers;
use crate::error::{panic_message, GatewayError};
use crate::middleware::rate_limit::RateLimitLayer;
use crate::AppState;

/// Gateway liveness endpoint
pub const LIVENESS_PATH: &str = "/healthz";

/// Operator health query endpoint
pub const HEALTH_QUERY_PATH: &str = "/gateway/health";

/// Build the gateway router. Paths not claimed by the gateway's own
/// endpoints are handed to the dispatcher.
pub fn create_router(state: Arc<AppState>) -> Router {
    let rate_limit = &state.settings.rate_limit;
    let rate_limiter = rate_limit.enabled.then(|| {
        RateLimitLayer::new(rate_limit.requests_per_second, rate_limit.burst_size)
            .exempt(&[LIVENESS_PATH, HEALTH_QUERY_PATH])
    });

    let mut router = Router::new()
        .route(LIVENESS_PATH, get(handlers::liveness))
        .route(HEALTH_QUERY_PATH, get(handlers::latest_health))
        .route("/gateway/health/:service", get(handlers::service_history))
        .route("/gateway/health/:service/check", post(handlers::check_service))
        .fallback(handlers::proxy)
        .with_state(state);

    if let Some(layer) = rate_limiter {
        router = router.layer(layer);
    }

    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
}

/// Generic 500 for a handler that panicked
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic_message(payload.as_ref());
    error!(panic = %detail, "Request handler panicked");
    GatewayError::Internal(detail).into_response()
}
