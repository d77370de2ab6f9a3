//! Request handlers for the gateway's own endpoints and the proxy fallback

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::error::{GatewayError, Result};
use crate::gateway::health_check::HealthSummary;
use crate::store::{HealthStatus, ServiceHealthRecord};
use crate::AppState;

/// Public view of a health record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealthView {
    pub service_name: String,
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ServiceHealthRecord> for ServiceHealthView {
    fn from(record: &ServiceHealthRecord) -> Self {
        Self {
            service_name: record.service_name.clone(),
            status: record.status,
            checked_at: record.checked_at,
            latency_ms: record.latency_ms,
            http_status: record.http_status,
            error: record.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthOrder {
    #[default]
    Recency,
    Name,
}

#[derive(Debug, Default, Deserialize)]
pub struct LatestQuery {
    #[serde(default)]
    pub order: HealthOrder,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub summary: HealthSummary,
    pub services: Vec<ServiceHealthView>,
}

/// Gateway liveness
pub async fn liveness() -> &'static str {
    "ok"
}

/// Latest status of every monitored service
pub async fn latest_health(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LatestQuery>,
) -> Result<Json<HealthReport>> {
    let records = state.health_monitor.latest_logs().await?;
    let mut services: Vec<ServiceHealthView> = records.iter().map(ServiceHealthView::from).collect();
    if let HealthOrder::Name = query.order {
        services.sort_by(|a, b| a.service_name.cmp(&b.service_name));
    }

    let summary = state.health_monitor.summary().await?;
    Ok(Json(HealthReport { summary, services }))
}

/// Retained history of one service
pub async fn service_history(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ServiceHealthView>>> {
    let records = state.health_monitor.history(&service, query.limit).await?;
    if records.is_empty() && state.health_monitor.target(&service).is_none() {
        return Err(GatewayError::NotFound(format!("Unknown service '{}'", service)));
    }
    Ok(Json(records.iter().map(ServiceHealthView::from).collect()))
}

/// Check one service now
pub async fn check_service(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Result<Response> {
    match state.health_monitor.check_now(&service).await? {
        Some(record) => Ok(Json(ServiceHealthView::from(&record)).into_response()),
        None => Ok((
            StatusCode::CONFLICT,
            Json(json!({ "message": format!("A check of '{}' is already running", service) })),
        )
            .into_response()),
    }
}

/// Everything else goes through the dispatcher
pub async fn proxy(State(state): State<Arc<AppState>>, request: Request) -> Response {
    state.dispatcher.handle(request).await
}
