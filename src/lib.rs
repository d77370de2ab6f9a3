//! Service Gateway
//!
//! Single entry point in front of the business microservices. Requests are
//! matched against a prefix route table, checked by a JWT auth gate and
//! forwarded to the route's backend cluster, while a background monitor
//! checks every backend and keeps an append-only health log.

pub mod api;
pub mod audit;
pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod store;

pub use error::{GatewayError, Result};

use std::sync::Arc;

use audit::AuditSink;
use backend::{http_backend::HttpUpstream, traits::Upstream};
use config::Settings;
use gateway::{dispatcher::Dispatcher, health_check::HealthMonitor, router::{RouteTable, SharedRouteTable}};
use middleware::auth::AuthGate;
use store::{FileHealthLogStore, HealthLogStore, MemoryHealthLogStore};

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<Settings>,
    pub route_table: Arc<SharedRouteTable>,
    pub dispatcher: Arc<Dispatcher>,
    pub health_monitor: Arc<HealthMonitor>,
}

impl AppState {
    /// Build every component from configuration: health log store and audit
    /// sink are chosen by `health.log_path` and `audit.endpoint`.
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        let store: Arc<dyn HealthLogStore> = match &settings.health.log_path {
            Some(path) => Arc::new(FileHealthLogStore::open(path, settings.health.history_limit).await?),
            None => Arc::new(MemoryHealthLogStore::new(settings.health.history_limit)),
        };
        let audit: Arc<dyn AuditSink> = Arc::from(audit::sink_from_config(&settings.audit)?);
        let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::new(&settings.proxy)?);

        Self::with_components(settings, store, audit, upstream)
    }

    /// Build the state around explicitly supplied collaborators
    pub fn with_components(
        settings: Settings,
        store: Arc<dyn HealthLogStore>,
        audit: Arc<dyn AuditSink>,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Self> {
        let route_table = Arc::new(SharedRouteTable::new(RouteTable::from_settings(&settings)?));
        let auth = Arc::new(AuthGate::new(&settings.auth)?);
        let health_monitor = Arc::new(HealthMonitor::new(&settings.health, store)?);

        let dispatcher = Arc::new(Dispatcher::new(
            route_table.clone(),
            auth,
            upstream,
            audit,
            settings.proxy.max_body_bytes,
        ));

        Ok(Self {
            settings: Arc::new(settings),
            route_table,
            dispatcher,
            health_monitor,
        })
    }
}
