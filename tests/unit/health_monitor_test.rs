//! Unit tests for the health monitor schedule and per-service isolation

use service_gateway::config::{HealthConfig, HealthTargetConfig};
use service_gateway::gateway::health_check::HealthMonitor;
use service_gateway::store::{HealthLogStore, HealthStatus, MemoryHealthLogStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(timeout_ms: u64, services: Vec<(&str, String)>) -> HealthConfig {
    HealthConfig {
        interval_secs: 1,
        timeout_ms,
        services: services
            .into_iter()
            .map(|(name, url)| HealthTargetConfig {
                name: name.to_string(),
                url,
                interval_secs: None,
            })
            .collect(),
        ..HealthConfig::default()
    }
}

#[tokio::test]
async fn test_overlapping_check_of_same_service_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/health", server.uri());
    let store = Arc::new(MemoryHealthLogStore::default());
    let monitor = HealthMonitor::new(&config(2000, vec![("users", url.clone())]), store.clone()).unwrap();

    let (first, second) = tokio::join!(monitor.check_and_log("users", &url), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.check_and_log("users", &url).await
    });

    assert_eq!(first.map(|r| r.status), Some(HealthStatus::Healthy));
    assert!(second.is_none());
    assert_eq!(store.history("users", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_slow_service_does_not_delay_others() {
    let slow = MockServer::start().await;
    let fast = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&slow)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&fast)
        .await;

    let store = Arc::new(MemoryHealthLogStore::default());
    let monitor = HealthMonitor::new(
        &config(
            1500,
            vec![("leaves", format!("{}/health", slow.uri())), ("users", format!("{}/health", fast.uri()))],
        ),
        store.clone(),
    )
    .unwrap();

    let started = Instant::now();
    let (slow_record, fast_record) = tokio::join!(
        monitor.check_now("leaves"),
        async {
            let record = monitor.check_now("users").await;
            (record, started.elapsed())
        }
    );

    let (fast_record, fast_elapsed) = fast_record;
    assert_eq!(fast_record.unwrap().unwrap().status, HealthStatus::Healthy);
    assert!(fast_elapsed < Duration::from_millis(1000));
    assert_eq!(slow_record.unwrap().unwrap().status, HealthStatus::Unreachable);
}

#[tokio::test]
async fn test_started_monitor_records_periodically_until_stopped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryHealthLogStore::default());
    let monitor = Arc::new(
        HealthMonitor::new(&config(500, vec![("users", format!("{}/health", server.uri()))]), store.clone()).unwrap(),
    );

    monitor.start();
    // First tick fires immediately, the second after one interval
    tokio::time::sleep(Duration::from_millis(1300)).await;
    monitor.stop();

    let recorded = store.history("users", 100).await.unwrap().len();
    assert!(recorded >= 2, "expected at least two checks, got {}", recorded);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(store.history("users", 100).await.unwrap().len(), recorded);
}

#[tokio::test]
async fn test_stable_backend_reports_same_status_until_it_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let url = format!("{}/health", server.uri());
    let store = Arc::new(MemoryHealthLogStore::default());
    let monitor = HealthMonitor::new(&config(500, vec![("users", url.clone())]), store.clone()).unwrap();

    for _ in 0..4 {
        let record = monitor.check_and_log("users", &url).await.unwrap();
        assert_eq!(record.status, HealthStatus::Healthy);
        let latest = monitor.latest_logs().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, record.id);
    }

    drop(server);

    let record = monitor.check_and_log("users", &url).await.unwrap();
    assert_eq!(record.status, HealthStatus::Unreachable);

    let history = store.history("users", 100).await.unwrap();
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].status, HealthStatus::Unreachable);
    assert!(history[1..].iter().all(|r| r.status == HealthStatus::Healthy));
    assert_eq!(monitor.latest_logs().await.unwrap()[0].status, HealthStatus::Unreachable);
}

#[tokio::test]
async fn test_non_success_status_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryHealthLogStore::default());
    let monitor = HealthMonitor::new(&config(500, vec![("users", format!("{}/health", server.uri()))]), store).unwrap();

    let record = monitor.check_now("users").await.unwrap().unwrap();
    assert_eq!(record.status, HealthStatus::Error);
    assert_eq!(record.http_status, Some(500));
}

#[tokio::test]
async fn test_unknown_service_check_fails() {
    let store = Arc::new(MemoryHealthLogStore::default());
    let monitor = HealthMonitor::new(&config(500, vec![]), store).unwrap();

    assert!(monitor.check_now("payroll").await.is_err());
}
