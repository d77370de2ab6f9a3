//! Health monitor probing backend services and appending to the health log

use dashmap::DashMap;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::HealthConfig;
use crate::error::{GatewayError, Result};
use crate::store::{HealthLogStore, HealthStatus, ServiceHealthRecord};

/// A monitored service
#[derive(Debug, Clone)]
pub struct HealthTarget {
    pub name: String,
    pub url: String,
    pub interval: Duration,
}

/// Counts of services by their latest status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub unreachable: usize,
    pub error: usize,
    /// Not checked yet
    pub unknown: usize,
}

/// Health monitor.
///
/// Every target is polled by its own task, so a slow or dead service never
/// delays the others. A per-service guard keeps checks of one service from
/// overlapping; a check requested while another is in flight is skipped.
pub struct HealthMonitor {
    client: Client,
    store: Arc<dyn HealthLogStore>,
    targets: Vec<HealthTarget>,
    in_flight: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    last_status: DashMap<String, HealthStatus>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl HealthMonitor {
    /// Create a monitor for the configured services
    pub fn new(config: &HealthConfig, store: Arc<dyn HealthLogStore>) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create health check client: {}", e)))?;

        let targets = config
            .services
            .iter()
            .map(|s| HealthTarget {
                name: s.name.clone(),
                url: s.url.clone(),
                interval: Duration::from_secs(s.interval_secs.unwrap_or(config.interval_secs).max(1)),
            })
            .collect();

        Ok(Self {
            client,
            store,
            targets,
            in_flight: DashMap::new(),
            last_status: DashMap::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn targets(&self) -> &[HealthTarget] {
        &self.targets
    }

    pub fn target(&self, name: &str) -> Option<&HealthTarget> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Start one polling task per target. Tasks run until [`HealthMonitor::stop`].
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            warn!("Health monitor already started");
            return;
        }

        for target in self.targets.clone() {
            info!(service = %target.name, interval_secs = target.interval.as_secs(), "Starting health check task");
            let monitor = Arc::clone(self);

            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(target.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    ticker.tick().await;
                    monitor.check_and_log(&target.name, &target.url).await;
                }
            });

            tasks.push(handle);
        }
    }

    /// Stop all polling tasks
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock();
        for handle in tasks.drain(..) {
            handle.abort();
        }
        info!("Stopped health check tasks");
    }

    /// Check `url` once and append the outcome as a record for `service_name`.
    ///
    /// Returns `None` without checking when a check of the same service is
    /// still in flight. Failures are recorded, never returned.
    pub async fn check_and_log(&self, service_name: &str, url: &str) -> Option<ServiceHealthRecord> {
        let guard = self
            .in_flight
            .entry(service_name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();

        let Ok(_permit) = guard.try_lock_owned() else {
            debug!(service = %service_name, "Previous check still running, skipping");
            return None;
        };

        let record = self.perform_check(service_name, url).await;
        self.note_transition(&record);

        if let Err(e) = self.store.append(record.clone()).await {
            error!(service = %service_name, error = %e, "Failed to append health record");
        }

        Some(record)
    }

    /// Check a configured service immediately
    pub async fn check_now(&self, service_name: &str) -> Result<Option<ServiceHealthRecord>> {
        let target = self
            .target(service_name)
            .ok_or_else(|| GatewayError::NotFound(format!("Unknown service '{}'", service_name)))?;
        Ok(self.check_and_log(&target.name, &target.url).await)
    }

    /// Most recent record per service, most-recent-first
    pub async fn latest_logs(&self) -> Result<Vec<ServiceHealthRecord>> {
        self.store.latest().await
    }

    /// Retained records for one service, newest first
    pub async fn history(&self, service_name: &str, limit: usize) -> Result<Vec<ServiceHealthRecord>> {
        self.store.history(service_name, limit).await
    }

    /// Counts of configured services by latest status
    pub async fn summary(&self) -> Result<HealthSummary> {
        let latest = self.store.latest().await?;
        let mut summary = HealthSummary {
            total: self.targets.len(),
            ..Default::default()
        };

        for target in &self.targets {
            match latest.iter().find(|r| r.service_name == target.name).map(|r| r.status) {
                Some(HealthStatus::Healthy) => summary.healthy += 1,
                Some(HealthStatus::Unreachable) => summary.unreachable += 1,
                Some(HealthStatus::Error) => summary.error += 1,
                None => summary.unknown += 1,
            }
        }

        Ok(summary)
    }

    async fn perform_check(&self, service_name: &str, url: &str) -> ServiceHealthRecord {
        let started = Instant::now();
        let mut record = ServiceHealthRecord::new(service_name, url, HealthStatus::Error);

        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                record.status = HealthStatus::Healthy;
                record.http_status = Some(response.status().as_u16());
            }
            Ok(response) => {
                record.status = HealthStatus::Error;
                record.http_status = Some(response.status().as_u16());
                record.error = Some(format!("Unexpected status {}", response.status()));
            }
            Err(e) if e.is_timeout() || e.is_connect() => {
                record.status = HealthStatus::Unreachable;
                record.error = Some(e.to_string());
            }
            Err(e) => {
                record.status = HealthStatus::Error;
                record.error = Some(e.to_string());
            }
        }

        record.latency_ms = started.elapsed().as_millis() as u64;
        record.checked_at = chrono::Utc::now();

        debug!(
            service = %service_name,
            status = %record.status,
            latency_ms = record.latency_ms,
            "Health check completed"
        );

        record
    }

    fn note_transition(&self, record: &ServiceHealthRecord) {
        let previous = self.last_status.insert(record.service_name.clone(), record.status);

        match (previous, record.status) {
            (Some(before), now) if before == now => {}
            (_, HealthStatus::Healthy) => {
                info!(service = %record.service_name, "Service is healthy");
            }
            (_, status) => {
                warn!(
                    service = %record.service_name,
                    status = %status,
                    error = record.error.as_deref().unwrap_or(""),
                    "Service is not healthy"
                );
            }
        }
    }
}
