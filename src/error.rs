//! Common error types for the gateway

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::any::Any;
use thiserror::Error;

/// Gateway-wide error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No route for path: {0}")]
    RouteNotFound(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend timed out: {0}")]
    BackendTimeout(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
}

impl GatewayError {
    /// Configuration error carrying a plain message
    pub fn config(message: impl Into<String>) -> Self {
        GatewayError::Config(config::ConfigError::Message(message.into()))
    }

    /// HTTP status this error is rendered with
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound(_) | GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::BackendUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::BackendTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Config(_)
            | GatewayError::Io(_)
            | GatewayError::Json(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> (&'static str, Option<&'static str>) {
        match self {
            GatewayError::RouteNotFound(_) => ("not_found_error", Some("route_not_found")),
            GatewayError::NotFound(_) => ("not_found_error", None),
            GatewayError::Unauthenticated(_) => ("authentication_error", Some("invalid_token")),
            GatewayError::Forbidden(_) => ("permission_error", Some("insufficient_role")),
            GatewayError::BackendUnavailable(_) => ("backend_error", Some("backend_unavailable")),
            GatewayError::BackendTimeout(_) => ("timeout_error", Some("backend_timeout")),
            GatewayError::PayloadTooLarge(_) => ("invalid_request_error", Some("payload_too_large")),
            GatewayError::RateLimitExceeded => ("rate_limit_error", Some("rate_limit_exceeded")),
            _ => ("server_error", None),
        }
    }

    /// Message shown to callers. Internal faults never leak their detail.
    fn public_message(&self) -> String {
        match self.status_code() {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error_type, code) = self.kind();

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message: self.public_message(),
                r#type: error_type.to_string(),
                code: code.map(|c| c.to_string()),
            },
        });

        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Text carried by a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic".to_string()
    }
}
