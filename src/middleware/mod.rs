//! Middleware module - Auth gate and rate limiting

pub mod auth;
pub mod rate_limit;
