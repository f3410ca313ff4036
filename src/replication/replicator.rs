//! Remote copy transports

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::ReplicationError;

const TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);

/// Copies a local file to a named remote destination
#[async_trait]
pub trait Replicator: Send + Sync {
    async fn transfer(&self, local_path: &Path, destination: &str) -> Result<(), ReplicationError>;
}

/// rsync over ssh with a dedicated identity file
#[derive(Debug, Clone)]
pub struct RsyncReplicator {
    key_path: PathBuf,
    /// `user@host:directory`
    remote_dir: String,
}

impl RsyncReplicator {
    /// Validate settings before any transfer is attempted
    pub fn from_settings(
        key_path: Option<PathBuf>,
        remote_dir: Option<String>,
    ) -> Result<Self, ReplicationError> {
        let key_path = key_path
            .ok_or_else(|| ReplicationError::Config("RSA_ID_PATH is not set".to_string()))?;
        let remote_dir = remote_dir
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| ReplicationError::Config("REMOTE_PATH is not set".to_string()))?;

        if !key_path.exists() {
            return Err(ReplicationError::Config(format!(
                "identity file {} does not exist",
                key_path.display()
            )));
        }

        Ok(Self {
            key_path,
            remote_dir,
        })
    }

    /// Full remote path for `destination`
    pub fn remote_path(&self, destination: &str) -> String {
        format!("{}/{}", self.remote_dir.trim_end_matches('/'), destination)
    }
}

#[async_trait]
impl Replicator for RsyncReplicator {
    async fn transfer(&self, local_path: &Path, destination: &str) -> Result<(), ReplicationError> {
        let remote = self.remote_path(destination);
        let ssh = format!("ssh -i {}", self.key_path.display());

        let mut command = Command::new("rsync");
        command
            .arg("-avz")
            .arg("-e")
            .arg(&ssh)
            .arg(local_path)
            .arg(&remote)
            .kill_on_drop(true);

        let output = tokio::time::timeout(TRANSFER_TIMEOUT, command.output())
            .await
            .map_err(|_| {
                ReplicationError::Transfer(format!(
                    "rsync to {} timed out after {:?}",
                    remote, TRANSFER_TIMEOUT
                ))
            })?
            .map_err(|e| ReplicationError::Transfer(format!("cannot run rsync: {}", e)))?;

        if !output.status.success() {
            return Err(ReplicationError::Transfer(format!(
                "rsync to {} exited with {}: {}",
                remote,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        tracing::info!(local = %local_path.display(), remote = %remote, "Replicated log store");
        Ok(())
    }
}
