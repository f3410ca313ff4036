//! Durable per-source log stores

pub mod entry;
pub mod lock;
pub mod log_store;
pub mod timestamp;

pub use entry::{into_record, record_from_text};
pub use lock::SaveLock;
pub use log_store::{latest_entry, most_recent_fields, LogStore, DEFAULT_RETENTION_DAYS};
pub use timestamp::{parse_timestamp, to_epoch};

use std::path::PathBuf;

/// A single log record: field name → JSON value
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Full contents of a store, keyed by timestamp string
pub type LogMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt log store {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Unrecognised timestamp format: {0}")]
    TimestampFormat(String),

    #[error("Invalid log entry: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timed out after {waited_ms}ms waiting for lock {}", path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },
}
