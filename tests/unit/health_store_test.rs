//! Unit tests for the health log stores

use chrono::{Duration, Utc};
use service_gateway::store::{
    FileHealthLogStore, HealthLogStore, HealthStatus, MemoryHealthLogStore, ServiceHealthRecord,
};
use std::sync::Arc;

fn record(service: &str, status: HealthStatus, seconds_ago: i64) -> ServiceHealthRecord {
    let mut record = ServiceHealthRecord::new(service, format!("http://{}/health", service), status);
    record.checked_at = Utc::now() - Duration::seconds(seconds_ago);
    record
}

async fn assert_latest_semantics(store: &dyn HealthLogStore) {
    store.append(record("users", HealthStatus::Healthy, 30)).await.unwrap();
    store.append(record("leaves", HealthStatus::Healthy, 20)).await.unwrap();
    store.append(record("users", HealthStatus::Unreachable, 10)).await.unwrap();

    let latest = store.latest().await.unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].service_name, "users");
    assert_eq!(latest[0].status, HealthStatus::Unreachable);
    assert_eq!(latest[1].service_name, "leaves");

    let history = store.history("users", 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, HealthStatus::Unreachable);
    assert_eq!(history[1].status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_memory_store_latest_per_service() {
    assert_latest_semantics(&MemoryHealthLogStore::default()).await;
}

#[tokio::test]
async fn test_file_store_latest_per_service() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileHealthLogStore::open(dir.path().join("health.jsonl"), 100).await.unwrap();
    assert_latest_semantics(&store).await;
}

#[tokio::test]
async fn test_empty_store() {
    let store = MemoryHealthLogStore::default();
    assert!(store.latest().await.unwrap().is_empty());
    assert!(store.history("users", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stable_status_keeps_appending() {
    let store = MemoryHealthLogStore::new(100);
    for i in 0..5 {
        store.append(record("users", HealthStatus::Healthy, 50 - i)).await.unwrap();
    }

    let latest = store.latest().await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].status, HealthStatus::Healthy);
    assert_eq!(store.history("users", 100).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_history_is_bounded() {
    let store = MemoryHealthLogStore::new(3);
    for i in 0..10 {
        store.append(record("users", HealthStatus::Healthy, 100 - i)).await.unwrap();
    }

    let history = store.history("users", 10).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history[0].checked_at > history[2].checked_at);
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("health.jsonl");

    {
        let store = FileHealthLogStore::open(&path, 100).await.unwrap();
        store.append(record("users", HealthStatus::Healthy, 20)).await.unwrap();
        store.append(record("users", HealthStatus::Error, 10)).await.unwrap();
    }

    let store = FileHealthLogStore::open(&path, 100).await.unwrap();
    let latest = store.latest().await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].status, HealthStatus::Error);
    assert_eq!(store.history("users", 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_appends_are_all_kept() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileHealthLogStore::open(dir.path().join("health.jsonl"), 1000).await.unwrap());

    let writers: Vec<_> = ["users", "leaves", "subscriptions", "notifications"]
        .into_iter()
        .map(|service| {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..25 {
                    store
                        .append(ServiceHealthRecord::new(service, "http://x/health", HealthStatus::Healthy))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }

    let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
    assert_eq!(contents.lines().count(), 100);
    for line in contents.lines() {
        serde_json::from_str::<ServiceHealthRecord>(line).unwrap();
    }
    assert_eq!(store.latest().await.unwrap().len(), 4);
}
