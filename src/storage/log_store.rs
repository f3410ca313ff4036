//! JSON-backed timestamp → record store
//!
//! One store per source file. The file is a single JSON object whose keys are
//! timestamps (epoch seconds or ISO-8601) and whose values are records. Reads
//! go straight to disk; every mutation runs under [`SaveLock`] and is written
//! to a temporary file that is renamed over the original.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::lock::SaveLock;
use super::timestamp::{format_timestamp, parse_timestamp, to_epoch};
use super::{LogMap, Record, StoreError};

const SECONDS_PER_DAY: f64 = 24.0 * 3600.0;

/// Default retention used by prune
pub const DEFAULT_RETENTION_DAYS: u32 = 3;

/// Handle to one on-disk log store
#[derive(Debug, Clone)]
pub struct LogStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl LogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: Duration::from_secs(10),
        }
    }

    /// Set how long mutations wait for the save lock
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the backing file as `{}` if it does not exist yet
    pub fn ensure_exists(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // create_new so a concurrent creator never gets truncated
        match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(mut file) => {
                file.write_all(b"{}")?;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load every entry, preserving on-disk key order
    pub fn load(&self) -> Result<LogMap, StoreError> {
        self.ensure_exists()?;
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(LogMap::new());
        }

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(StoreError::Corrupt {
                path: self.path.clone(),
                reason: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
            Err(e) => Err(StoreError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Stamp `record` with `now` and merge it into the store
    ///
    /// Existing entries are never replaced: when the key for `now` is taken
    /// the stamp moves forward one microsecond at a time until it is free.
    /// Returns the key the record was stored under.
    pub fn append(&self, record: Record, now: DateTime<Utc>) -> Result<String, StoreError> {
        let _lock = SaveLock::acquire(&self.path, self.lock_timeout)?;

        let mut entries = self.load()?;
        let key = free_key(&entries, now);
        entries.insert(key.clone(), Value::Object(record));
        self.persist(&entries)?;

        tracing::debug!(path = %self.path.display(), key = %key, "Appended log entry");
        Ok(key)
    }

    /// Remove entries older than `retention_days` before `now`
    ///
    /// Returns the number of removed entries. Keys that cannot be parsed are
    /// kept. Pruning an already pruned store removes nothing.
    pub fn prune(&self, retention_days: u32, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let _lock = SaveLock::acquire(&self.path, self.lock_timeout)?;

        let mut entries = self.load()?;
        let cutoff = to_epoch(now) - f64::from(retention_days) * SECONDS_PER_DAY;

        let expired: Vec<String> = entries
            .keys()
            .filter(|key| match parse_timestamp(key) {
                Ok(ts) => ts < cutoff,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "Keeping entry with unparseable key");
                    false
                }
            })
            .cloned()
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        for key in &expired {
            entries.shift_remove(key);
        }
        self.persist(&entries)?;

        tracing::info!(
            path = %self.path.display(),
            removed = expired.len(),
            retention_days,
            "Pruned log store"
        );
        Ok(expired.len())
    }

    /// Field subset of the newest record, or an empty map for an empty store
    pub fn most_recent(&self, fields: &[&str]) -> Result<Record, StoreError> {
        let entries = self.load()?;
        Ok(most_recent_fields(&entries, fields))
    }

    /// Last modification time of the backing file
    pub fn modified(&self) -> Result<SystemTime, StoreError> {
        Ok(fs::metadata(&self.path)?.modified()?)
    }

    fn persist(&self, entries: &LogMap) -> Result<(), StoreError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        entries
            .serialize(&mut serializer)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }
}

fn free_key(entries: &LogMap, now: DateTime<Utc>) -> String {
    let mut stamp = now;
    let mut key = format_timestamp(stamp);
    while entries.contains_key(&key) {
        match stamp.checked_add_signed(chrono::Duration::microseconds(1)) {
            Some(next) => stamp = next,
            None => break,
        }
        key = format_timestamp(stamp);
    }
    key
}

/// Newest entry by parsed timestamp; unparseable keys are skipped
pub fn latest_entry(entries: &LogMap) -> Option<(f64, &Value)> {
    entries
        .iter()
        .filter_map(|(key, value)| parse_timestamp(key).ok().map(|ts| (ts, value)))
        .max_by(|a, b| a.0.total_cmp(&b.0))
}

/// Field subset of the newest record in `entries`
pub fn most_recent_fields(entries: &LogMap, fields: &[&str]) -> Record {
    let Some((_, Value::Object(record))) = latest_entry(entries) else {
        return Record::new();
    };

    fields
        .iter()
        .filter_map(|field| record.get(*field).map(|v| (field.to_string(), v.clone())))
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
