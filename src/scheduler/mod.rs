//! Periodic and one-shot job scheduling

pub mod job;
pub mod queue;
pub mod sleep;

pub use job::{Job, JobId, JobInfo};
pub use queue::{DueJob, JobScheduler};
pub use sleep::{parse_sleep_seconds, DEFAULT_SLEEP_SECS, MAX_SLEEP_SECS};
