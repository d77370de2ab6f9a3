//! In-memory health log with bounded per-service retention

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use crate::error::Result;
use crate::store::health_log::{sort_most_recent_first, HealthLogStore, ServiceHealthRecord};

pub struct MemoryHealthLogStore {
    records: Mutex<HashMap<String, VecDeque<ServiceHealthRecord>>>,
    history_limit: usize,
}

impl MemoryHealthLogStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            history_limit: history_limit.max(1),
        }
    }
}

impl Default for MemoryHealthLogStore {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl HealthLogStore for MemoryHealthLogStore {
    async fn append(&self, record: ServiceHealthRecord) -> Result<()> {
        let mut records = self.records.lock();
        let log = records.entry(record.service_name.clone()).or_default();
        log.push_back(record);
        while log.len() > self.history_limit {
            log.pop_front();
        }
        Ok(())
    }

    async fn latest(&self) -> Result<Vec<ServiceHealthRecord>> {
        let mut latest: Vec<_> = self
            .records
            .lock()
            .values()
            .filter_map(|log| log.back().cloned())
            .collect();
        sort_most_recent_first(&mut latest);
        Ok(latest)
    }

    async fn history(&self, service_name: &str, limit: usize) -> Result<Vec<ServiceHealthRecord>> {
        Ok(self
            .records
            .lock()
            .get(service_name)
            .map(|log| log.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
