//! JSON-lines file backed health log

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::health_log::{sort_most_recent_first, HealthLogStore, ServiceHealthRecord};

/// Durable health log.
///
/// Every record is one JSON line written with a single `write_all` while the
/// file lock is held. Recent records per service are mirrored in memory; the
/// mirror is rebuilt from the file on open.
pub struct FileHealthLogStore {
    path: PathBuf,
    file: Mutex<File>,
    recent: RwLock<HashMap<String, VecDeque<ServiceHealthRecord>>>,
    history_limit: usize,
}

impl FileHealthLogStore {
    /// Open (or create) the log at `path`, replaying existing records
    pub async fn open<P: AsRef<Path>>(path: P, history_limit: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let history_limit = history_limit.max(1);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
                debug!(path = ?parent, "Created health log directory");
            }
        }

        let mut recent: HashMap<String, VecDeque<ServiceHealthRecord>> = HashMap::new();
        let mut replayed = 0usize;
        let mut torn_tail = false;
        if path.exists() {
            let contents = fs::read_to_string(&path).await?;
            torn_tail = !contents.is_empty() && !contents.ends_with('\n');
            for (line_no, line) in contents.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ServiceHealthRecord>(line) {
                    Ok(record) => {
                        push_bounded(&mut recent, record, history_limit);
                        replayed += 1;
                    }
                    Err(e) => {
                        warn!(path = ?path, line = line_no + 1, error = %e, "Skipping malformed health log line");
                    }
                }
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path).await?;
        if torn_tail {
            // terminate the partial last line so the next record starts on its own line
            file.write_all(b"\n").await?;
            file.flush().await?;
            warn!(path = ?path, "Health log ended with a partial line");
        }
        info!(path = ?path, replayed = replayed, "Opened health log");

        Ok(Self {
            path,
            file: Mutex::new(file),
            recent: RwLock::new(recent),
            history_limit,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn push_bounded(
    recent: &mut HashMap<String, VecDeque<ServiceHealthRecord>>,
    record: ServiceHealthRecord,
    limit: usize,
) {
    let log = recent.entry(record.service_name.clone()).or_default();
    log.push_back(record);
    while log.len() > limit {
        log.pop_front();
    }
}

#[async_trait]
impl HealthLogStore for FileHealthLogStore {
    async fn append(&self, record: ServiceHealthRecord) -> Result<()> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        let committed = file.metadata().await?.len();
        let written = async {
            file.write_all(&line).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            // drop whatever part of the line reached the file
            if let Err(truncate) = file.set_len(committed).await {
                warn!(path = ?self.path, error = %truncate, "Failed to roll back partial health log write");
            }
            return Err(e.into());
        }
        // mirror updated while the file lock is held so both share one order
        push_bounded(&mut self.recent.write(), record, self.history_limit);
        Ok(())
    }

    async fn latest(&self) -> Result<Vec<ServiceHealthRecord>> {
        let mut latest: Vec<_> = self
            .recent
            .read()
            .values()
            .filter_map(|log| log.back().cloned())
            .collect();
        sort_most_recent_first(&mut latest);
        Ok(latest)
    }

    async fn history(&self, service_name: &str, limit: usize) -> Result<Vec<ServiceHealthRecord>> {
        Ok(self
            .recent
            .read()
            .get(service_name)
            .map(|log| log.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
