//! Functional tests for the operator health endpoints

use axum::{
    body::Body,
    http::{Method, StatusCode},
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::*;

async fn monitored_gateway() -> (TestGateway, MockServer, MockServer) {
    let users = MockServer::start().await;
    let leaves = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&users)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&leaves)
        .await;

    let mut config = settings(&users.uri(), &leaves.uri());
    config.health.services = vec![
        health_target("users", format!("{}/health", users.uri())),
        health_target("leaves", format!("{}/health", leaves.uri())),
        health_target("notifications", format!("{}/health", refused_url())),
    ];

    (gateway(config), users, leaves)
}

#[tokio::test]
async fn test_liveness() {
    let (gw, _users, _leaves) = monitored_gateway().await;

    let response = send(&gw.app, request(Method::GET, "/healthz", None, Body::empty())).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&body_bytes(response).await[..], b"ok");
}

#[tokio::test]
async fn test_health_report_before_any_check() {
    let (gw, _users, _leaves) = monitored_gateway().await;

    let response = send(&gw.app, request(Method::GET, "/gateway/health", None, Body::empty())).await;
    assert_eq!(response.status(), StatusCode::OK);

    let report = body_json(response).await;
    assert_eq!(report["summary"]["total"], 3);
    assert_eq!(report["summary"]["unknown"], 3);
    assert_eq!(report["services"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_health_report_after_checks() {
    let (gw, _users, _leaves) = monitored_gateway().await;

    for name in ["users", "leaves", "notifications"] {
        gw.state.health_monitor.check_now(name).await.unwrap();
    }

    let response = send(
        &gw.app,
        request(Method::GET, "/gateway/health?order=name", None, Body::empty()),
    )
    .await;
    let report = body_json(response).await;

    assert_eq!(report["summary"]["healthy"], 1);
    assert_eq!(report["summary"]["error"], 1);
    assert_eq!(report["summary"]["unreachable"], 1);
    assert_eq!(report["summary"]["unknown"], 0);

    let services = report["services"].as_array().unwrap();
    let names: Vec<&str> = services.iter().map(|s| s["service_name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["leaves", "notifications", "users"]);
    assert_eq!(services[0]["status"], "Error");
    assert_eq!(services[0]["http_status"], 503);
    assert_eq!(services[1]["status"], "Unreachable");
    assert_eq!(services[2]["status"], "Healthy");
}

#[tokio::test]
async fn test_manual_check_and_history() {
    let (gw, _users, _leaves) = monitored_gateway().await;

    for _ in 0..3 {
        let response = send(
            &gw.app,
            request(Method::POST, "/gateway/health/users/check", None, Body::empty()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "Healthy");
    }

    let response = send(
        &gw.app,
        request(Method::GET, "/gateway/health/users?limit=2", None, Body::empty()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let history = body_json(response).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    let checked_at = |i: usize| chrono::DateTime::parse_from_rfc3339(history[i]["checked_at"].as_str().unwrap()).unwrap();
    assert!(checked_at(0) >= checked_at(1));
}

#[tokio::test]
async fn test_unknown_service_returns_404() {
    let (gw, _users, _leaves) = monitored_gateway().await;

    let response = send(
        &gw.app,
        request(Method::GET, "/gateway/health/payroll", None, Body::empty()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(
        &gw.app,
        request(Method::POST, "/gateway/health/payroll/check", None, Body::empty()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
