//! Cross-process save lock
//!
//! Every mutation of a log store holds an exclusive `flock` on a sibling lock
//! file for the whole read-modify-write cycle. The guard unlocks on drop, so
//! the lock is released on every exit path including errors.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::StoreError;

/// Name of the lock scope shared by every process saving a store
pub const SAVE_LOCK_SCOPE: &str = "log_save";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Held save lock; released on drop
#[derive(Debug)]
pub struct SaveLock {
    file: File,
    path: PathBuf,
}

impl SaveLock {
    /// Lock file path for a store
    pub fn lock_path(store_path: &Path) -> PathBuf {
        let mut name = store_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.lock", SAVE_LOCK_SCOPE));
        store_path.with_file_name(name)
    }

    /// Acquire the save lock for `store_path`, polling until `timeout`
    pub fn acquire(store_path: &Path, timeout: Duration) -> Result<Self, StoreError> {
        let path = Self::lock_path(store_path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let fd = file.as_raw_fd();
        let deadline = Instant::now() + timeout;

        loop {
            // SAFETY: fd belongs to `file`, which outlives this call.
            let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
            if ret == 0 {
                return Ok(Self { file, path });
            }

            if Instant::now() >= deadline {
                return Err(StoreError::LockTimeout {
                    path,
                    waited_ms: timeout.as_millis() as u64,
                });
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SaveLock {
    fn drop(&mut self) {
        // The lock file itself stays; unlinking it would let a waiter lock a
        // stale inode.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_is_sibling() {
        let path = Path::new("/var/log/general_logs.json");
        assert_eq!(
            SaveLock::lock_path(path),
            PathBuf::from("/var/log/general_logs.json.log_save.lock")
        );
    }

    #[test]
    fn test_second_acquire_times_out_while_held() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("store.json");

        let held = SaveLock::acquire(&store, Duration::from_millis(200)).unwrap();
        let err = SaveLock::acquire(&store, Duration::from_millis(120)).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));

        drop(held);
        assert!(SaveLock::acquire(&store, Duration::from_millis(200)).is_ok());
    }
}
