//! Replicate the local log stores to the collector, then prune them
//!
//! Usage: logwarden-push
//!
//! Each store is sent as `<category>.<hostname>.json` into REMOTE_PATH
//! (`user@host:dir`) with rsync over ssh using RSA_ID_PATH. Transfer failures
//! are written into the general log so they reach the agent on the next push.
//! Exits non-zero when anything failed; stores are pruned regardless.

use std::sync::Arc;

use chrono::Utc;
use logwarden::config::{LogFilesConfig, GENERAL_LOGS, HEALTH_LOGS};
use logwarden::replication::{LogCategory, ReplicationPruner, Replicator, RsyncReplicator};
use logwarden::storage::LogStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn hostname() -> String {
    sysinfo::System::host_name()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logwarden=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let files = LogFilesConfig::from_env()?;
    let general = LogStore::new(&files.general_log);

    let replicator =
        RsyncReplicator::from_settings(files.rsa_id_path.clone(), files.remote_path.clone())
            .map(|r| Arc::new(r) as Arc<dyn Replicator>);

    let pruner = ReplicationPruner::new(
        hostname(),
        vec![
            LogCategory::new(HEALTH_LOGS, LogStore::new(&files.health_log)),
            LogCategory::new(GENERAL_LOGS, general.clone()),
        ],
        general,
        files.retention_days,
        replicator,
    );

    let report = pruner.run(Utc::now()).await;
    for outcome in &report.outcomes {
        tracing::info!(
            category = %outcome.category,
            destination = %outcome.destination,
            transferred = matches!(outcome.transfer, Some(Ok(()))),
            pruned = outcome.pruned.as_ref().copied().unwrap_or(0),
            "Push finished"
        );
    }

    let pruning_failed = report.outcomes.iter().any(|o| o.pruned.is_err());
    if report.config_error.is_some() || report.failed_transfers() > 0 || pruning_failed {
        std::process::exit(1);
    }
    Ok(())
}
