//! Record disk usage into the health log store, then prune it
//!
//! Usage: logwarden-probe [MOUNT_POINT]   (default: /)
//!
//! Honors HEALTH_LOGFILE and LOG_LIFE.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use logwarden::config::LogFilesConfig;
use logwarden::storage::{LogStore, Record};
use sysinfo::Disks;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Mounted filesystem: mount point, total bytes, available bytes
type Mount = (PathBuf, u64, u64);

/// Used share of the filesystem holding `path`, in percent with two decimals
fn disk_usage_percent(path: &Path) -> io::Result<f64> {
    let path = path.canonicalize()?;
    let disks = Disks::new_with_refreshed_list();
    let mounts: Vec<Mount> = disks
        .iter()
        .map(|d| (d.mount_point().to_path_buf(), d.total_space(), d.available_space()))
        .collect();

    usage_on(&path, &mounts).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no mounted filesystem holds {}", path.display()),
        )
    })
}

/// Usage of the innermost mount containing `path`
fn usage_on(path: &Path, mounts: &[Mount]) -> Option<f64> {
    let (_, total, available) = mounts
        .iter()
        .filter(|(mount, _, _)| path.starts_with(mount))
        .max_by_key(|(mount, _, _)| mount.components().count())?;

    if *total == 0 {
        return Some(0.0);
    }
    let used = total.saturating_sub(*available) as f64;
    Some((used / *total as f64 * 100.0 * 100.0).round() / 100.0)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logwarden=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mount = std::env::args().nth(1).unwrap_or_else(|| "/".to_string());
    let files = LogFilesConfig::from_env()?;
    let store = LogStore::new(&files.health_log);
    let now = Utc::now();

    let usage = disk_usage_percent(Path::new(&mount))?;
    let mut record = Record::new();
    record.insert("disk_usage".to_string(), serde_json::json!(usage));

    let key = store.append(record, now)?;
    let removed = store.prune(files.retention_days, now)?;
    tracing::info!(
        path = %store.path().display(),
        key = %key,
        disk_usage = usage,
        removed,
        "Recorded health sample"
    );
    Ok(())
}
