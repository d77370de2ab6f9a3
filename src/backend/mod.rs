//! Backend module - Upstream trait and HTTP forwarding client

pub mod http_backend;
pub mod traits;
