//! Replication of local log stores to a central collector, followed by
//! retention pruning.

pub mod pruner;
pub mod replicator;

pub use pruner::{CategoryOutcome, LogCategory, ReplicationPruner, ReplicationReport};
pub use replicator::{Replicator, RsyncReplicator};

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("Replication not configured: {0}")]
    Config(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),
}
