//! Push-then-prune over every local log category

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::replicator::Replicator;
use super::ReplicationError;
use crate::storage::{LogStore, Record, StoreError};

/// One local store and the category it is published under
#[derive(Debug, Clone)]
pub struct LogCategory {
    pub name: String,
    pub store: LogStore,
}

impl LogCategory {
    pub fn new(name: impl Into<String>, store: LogStore) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }
}

/// What happened to one category
#[derive(Debug)]
pub struct CategoryOutcome {
    pub category: String,
    pub destination: String,
    /// `None` when no transfer was attempted
    pub transfer: Option<Result<(), ReplicationError>>,
    pub pruned: Result<usize, StoreError>,
}

#[derive(Debug, Default)]
pub struct ReplicationReport {
    /// Set when replication was skipped for every category
    pub config_error: Option<String>,
    pub outcomes: Vec<CategoryOutcome>,
}

impl ReplicationReport {
    pub fn failed_transfers(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.transfer, Some(Err(_))))
            .count()
    }
}

pub struct ReplicationPruner {
    host: String,
    categories: Vec<LogCategory>,
    /// Store that receives transfer failures as alarm entries
    failure_log: LogStore,
    retention_days: u32,
    replicator: Result<Arc<dyn Replicator>, ReplicationError>,
}

impl ReplicationPruner {
    pub fn new(
        host: impl Into<String>,
        categories: Vec<LogCategory>,
        failure_log: LogStore,
        retention_days: u32,
        replicator: Result<Arc<dyn Replicator>, ReplicationError>,
    ) -> Self {
        Self {
            host: host.into(),
            categories,
            failure_log,
            retention_days,
            replicator,
        }
    }

    /// Remote file name for a category on this host
    pub fn destination(&self, category: &str) -> String {
        format!("{}.{}.json", category, self.host)
    }

    /// Replicate each category (when configured) and prune it afterwards
    pub async fn run(&self, now: DateTime<Utc>) -> ReplicationReport {
        let mut report = ReplicationReport::default();

        let replicator = match &self.replicator {
            Ok(replicator) => Some(Arc::clone(replicator)),
            Err(e) => {
                tracing::error!(error = %e, "Replication skipped; pruning only");
                self.record_failure(format!("log replication skipped: {}", e))
                    .await;
                report.config_error = Some(e.to_string());
                None
            }
        };

        for category in &self.categories {
            let destination = self.destination(&category.name);

            let transfer = match &replicator {
                Some(replicator) => {
                    let result = replicator
                        .transfer(category.store.path(), &destination)
                        .await;
                    if let Err(e) = &result {
                        tracing::error!(category = %category.name, error = %e, "Replication failed");
                        self.record_failure(format!(
                            "while replicating {} to {}, an error occurred: {}",
                            category.store.path().display(),
                            destination,
                            e
                        ))
                        .await;
                    }
                    Some(result)
                }
                None => None,
            };

            let store = category.store.clone();
            let retention_days = self.retention_days;
            let pruned = blocking(move || store.prune(retention_days, now)).await;
            if let Err(e) = &pruned {
                tracing::error!(category = %category.name, error = %e, "Pruning failed");
            }

            report.outcomes.push(CategoryOutcome {
                category: category.name.clone(),
                destination,
                transfer,
                pruned,
            });
        }

        report
    }

    /// Append an alarm entry stamped with the time of the failure
    async fn record_failure(&self, message: String) {
        let mut record = Record::new();
        record.insert("error".to_string(), Value::String(message));
        let store = self.failure_log.clone();
        if let Err(e) = blocking(move || store.append(record, Utc::now())).await {
            tracing::error!(error = %e, "Could not record replication failure");
        }
    }
}

/// Store mutations wait on the save lock, so they run off the async workers
async fn blocking<T, F>(op: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}
