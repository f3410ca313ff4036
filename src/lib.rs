//! Logwarden: scheduled log monitoring and alerting
//!
//! Remote hosts append timestamped records to local JSON log stores, replicate
//! them to a collector and prune old entries. The monitoring agent scans the
//! collected stores on a schedule, raises alarms for keyword hits and threshold
//! breaches, and sends throttled heartbeat summaries.
//!
//! # Components
//!
//! - **LogStore**: durable per-source store with cross-process save locking
//! - **ThresholdEvaluator**: keyword and threshold evaluation with staleness checks
//! - **HeartbeatThrottle**: per-category gating of informational messages
//! - **JobScheduler**: cooperative repeating and one-shot jobs
//! - **ReplicationPruner**: replicate each store, record failures, prune
//!
//! # Example
//!
//! ```no_run
//! use logwarden::storage::{record_from_text, LogStore};
//! use chrono::Utc;
//!
//! let store = LogStore::new("/var/lib/logwarden/general_logs.json");
//! store.append(record_from_text(r#"{"error": "backup failed"}"#), Utc::now()).unwrap();
//! store.prune(3, Utc::now()).unwrap();
//! ```

pub mod alerts;
pub mod api;
pub mod config;
pub mod monitor;
pub mod replication;
pub mod scheduler;
pub mod storage;

// Re-export commonly used types
pub use alerts::{HeartbeatThrottle, Notifier, ThresholdEvaluator};
pub use monitor::{Agent, MonitorContext};
pub use replication::{ReplicationError, ReplicationPruner};
pub use scheduler::JobScheduler;
pub use storage::{LogStore, StoreError};
