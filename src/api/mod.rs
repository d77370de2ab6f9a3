//! HTTP surface - gateway endpoints and the catch-all proxy

pub mod handlers;
pub mod routes;
