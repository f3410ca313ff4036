use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub type JobId = u64;

/// A scheduled task
///
/// Repeating jobs keep their schedule while disabled. One-shot jobs are
/// removed once their fire time has passed.
#[derive(Debug, Clone)]
pub struct Job<T> {
    pub id: JobId,
    pub name: String,
    pub task: T,
    pub interval: Option<Duration>,
    pub next_run: DateTime<Utc>,
    pub enabled: bool,
    pub(crate) removed: bool,
}

impl<T> Job<T> {
    pub fn is_repeating(&self) -> bool {
        self.interval.is_some()
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub(crate) fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.removed && self.next_run <= now
    }

    /// Move `next_run` past `now`; marks one-shot jobs removed
    pub(crate) fn advance(&mut self, now: DateTime<Utc>) {
        match self.interval.and_then(|i| chrono::Duration::from_std(i).ok()) {
            Some(step) if step > chrono::Duration::zero() => {
                while self.next_run <= now {
                    match self.next_run.checked_add_signed(step) {
                        Some(next) => self.next_run = next,
                        None => break,
                    }
                }
            }
            _ => self.removed = true,
        }
    }
}

/// Listing entry for a job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    pub enabled: bool,
    pub repeating: bool,
    pub next_run: Option<DateTime<Utc>>,
}

impl<T> From<&Job<T>> for JobInfo {
    fn from(job: &Job<T>) -> Self {
        Self {
            id: job.id,
            name: job.name.clone(),
            enabled: job.enabled,
            repeating: job.is_repeating(),
            next_run: (!job.removed).then_some(job.next_run),
        }
    }
}
