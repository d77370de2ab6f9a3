//! Fire-and-forget audit records for denied and failed dispatches

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::AuditConfig;
use crate::error::{GatewayError, Result};

/// Structured record handed to the external audit collector
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub actor: Option<String>,
    pub action_type: String,
    pub entity: String,
    pub success: bool,
    pub error: Option<String>,
    pub requester_address: String,
    pub timestamp: DateTime<Utc>,
}

/// Audit collaborator. Recording never blocks or fails the caller.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Emits audit records as structured log events on the `audit` target
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        info!(
            target: "audit",
            actor = record.actor.as_deref().unwrap_or("anonymous"),
            action = %record.action_type,
            entity = %record.entity,
            success = record.success,
            error = record.error.as_deref().unwrap_or(""),
            requester = %record.requester_address,
            timestamp = %record.timestamp,
            "Audit record"
        );
    }
}

/// Posts audit records as JSON to a collector endpoint from a spawned task
pub struct HttpAuditSink {
    client: Client,
    endpoint: String,
}

impl HttpAuditSink {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create audit client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl AuditSink for HttpAuditSink {
    fn record(&self, record: AuditRecord) {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();

        tokio::spawn(async move {
            match client.post(&endpoint).json(&record).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    warn!(endpoint = %endpoint, status = %response.status(), "Audit collector rejected record");
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Failed to deliver audit record");
                }
            }
        });
    }
}

/// Sink selected by configuration
pub fn sink_from_config(config: &AuditConfig) -> Result<Box<dyn AuditSink>> {
    match &config.endpoint {
        Some(endpoint) => Ok(Box::new(HttpAuditSink::new(endpoint.clone())?)),
        None => Ok(Box::new(TracingAuditSink)),
    }
}
