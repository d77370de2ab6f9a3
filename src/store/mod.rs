//! Health log store module - Record types, store trait and backends

pub mod file;
pub mod health_log;
pub mod memory;

pub use file::FileHealthLogStore;
pub use health_log::{HealthLogStore, HealthStatus, ServiceHealthRecord};
pub use memory::MemoryHealthLogStore;
