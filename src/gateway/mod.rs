//! Gateway module - Route table, destination selection, dispatch and health monitoring

pub mod dispatcher;
pub mod health_check;
pub mod load_balancer;
pub mod router;
