//! Functional tests for internal faults degrading to a generic 500

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, StatusCode},
};
use service_gateway::backend::traits::{ForwardRequest, Upstream, UpstreamResponse};
use service_gateway::gateway::router::Cluster;
use service_gateway::store::{HealthLogStore, MemoryHealthLogStore, ServiceHealthRecord};
use service_gateway::Result;
use std::sync::Arc;

use crate::common::*;

struct PanickingUpstream;

#[async_trait]
impl Upstream for PanickingUpstream {
    async fn forward(&self, _cluster: &Cluster, _request: ForwardRequest) -> Result<UpstreamResponse> {
        panic!("unexpected internal fault")
    }
}

struct PanickingStore;

#[async_trait]
impl HealthLogStore for PanickingStore {
    async fn append(&self, _record: ServiceHealthRecord) -> Result<()> {
        Ok(())
    }

    async fn latest(&self) -> Result<Vec<ServiceHealthRecord>> {
        panic!("health index corrupted")
    }

    async fn history(&self, _service_name: &str, _limit: usize) -> Result<Vec<ServiceHealthRecord>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_panic_during_forwarding_returns_500_and_audits() {
    let gw = gateway_with(
        settings("http://users:8080", "http://leaves:8080"),
        Arc::new(MemoryHealthLogStore::default()),
        Arc::new(PanickingUpstream),
    );

    let response = send(
        &gw.app,
        request(Method::GET, "/users/1", Some(&token("user-1", &[])), Body::empty()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], "Internal server error");
    assert_eq!(body["error"]["type"], "server_error");

    let records = gw.audit.records.lock();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action_type, "GET /users/1");
    assert_eq!(records[0].entity, "users");
    assert!(!records[0].success);
}

#[tokio::test]
async fn test_panic_in_gateway_endpoint_returns_500() {
    let gw = gateway_with(
        settings("http://users:8080", "http://leaves:8080"),
        Arc::new(PanickingStore),
        Arc::new(PanickingUpstream),
    );

    let response = send(&gw.app, request(Method::GET, "/gateway/health", None, Body::empty())).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"]["message"], "Internal server error");

    // The router keeps serving after a panic
    let response = send(&gw.app, request(Method::GET, "/healthz", None, Body::empty())).await;
    assert_eq!(response.status(), StatusCode::OK);
}
