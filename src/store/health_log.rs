//! Append-only health log types and the store trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Outcome of a single health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    /// 2xx within the timeout
    Healthy,
    /// Timeout or connection failure
    Unreachable,
    /// Non-2xx or malformed response
    Error,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "Healthy",
            HealthStatus::Unreachable => "Unreachable",
            HealthStatus::Error => "Error",
        };
        f.write_str(s)
    }
}

/// One immutable entry of the health log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealthRecord {
    pub id: Uuid,
    pub service_name: String,
    pub url: String,
    pub status: HealthStatus,
    /// When the check completed
    pub checked_at: DateTime<Utc>,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealthRecord {
    pub fn new(service_name: impl Into<String>, url: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_name: service_name.into(),
            url: url.into(),
            status,
            checked_at: Utc::now(),
            latency_ms: 0,
            http_status: None,
            error: None,
        }
    }
}

/// Durable, append-only store of health check outcomes.
///
/// Each `append` is atomic with respect to other appends. Records for one
/// service are kept in append order, so `latest` always reflects the most
/// recently appended record for every service.
#[async_trait]
pub trait HealthLogStore: Send + Sync {
    /// Append a record
    async fn append(&self, record: ServiceHealthRecord) -> Result<()>;

    /// Most recent record per service, most-recent-first
    async fn latest(&self) -> Result<Vec<ServiceHealthRecord>>;

    /// Up to `limit` retained records for one service, newest first
    async fn history(&self, service_name: &str, limit: usize) -> Result<Vec<ServiceHealthRecord>>;
}

/// Order records newest first, breaking ties by service name
pub(crate) fn sort_most_recent_first(records: &mut [ServiceHealthRecord]) {
    records.sort_by(|a, b| {
        b.checked_at
            .cmp(&a.checked_at)
            .then_with(|| a.service_name.cmp(&b.service_name))
    });
}
