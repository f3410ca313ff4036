//! Cooperative job queue
//!
//! The queue only tracks schedules; it never runs anything itself. The owner
//! asks for [`JobScheduler::due`] jobs on each tick and runs their tasks one
//! after another, so job bodies never interleave.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::job::{Job, JobId, JobInfo};

/// A job picked for execution
#[derive(Debug, Clone, PartialEq)]
pub struct DueJob<T> {
    pub id: JobId,
    pub name: String,
    pub task: T,
}

#[derive(Debug)]
pub struct JobScheduler<T> {
    jobs: Vec<Job<T>>,
    next_id: JobId,
}

impl<T: Clone> JobScheduler<T> {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a job that fires after `first` and then every `interval`
    pub fn schedule_repeating(
        &mut self,
        name: impl Into<String>,
        task: T,
        interval: Duration,
        first: Duration,
        now: DateTime<Utc>,
    ) -> JobId {
        self.insert(name.into(), task, Some(interval), first, now)
    }

    /// Register a job that fires once after `delay`
    pub fn schedule_once(
        &mut self,
        name: impl Into<String>,
        task: T,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> JobId {
        self.insert(name.into(), task, None, delay, now)
    }

    fn insert(
        &mut self,
        name: String,
        task: T,
        interval: Option<Duration>,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> JobId {
        let id = self.next_id;
        self.next_id += 1;

        // Delays past the calendar's end park the job there
        let next_run = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.jobs.push(Job {
            id,
            name,
            task,
            interval,
            next_run,
            enabled: true,
            removed: false,
        });
        id
    }

    /// Enable or disable a job; returns false for unknown or removed jobs
    pub fn set_enabled(&mut self, id: JobId, enabled: bool) -> bool {
        match self.jobs.iter_mut().find(|j| j.id == id && !j.removed) {
            Some(job) => {
                job.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, id: JobId) -> Option<bool> {
        self.get(id).map(|j| j.enabled)
    }

    pub fn get(&self, id: JobId) -> Option<&Job<T>> {
        self.jobs.iter().find(|j| j.id == id && !j.removed)
    }

    /// Remove pending one-shot jobs called `name`; returns how many were removed
    pub fn cancel_by_name(&mut self, name: &str) -> usize {
        let mut cancelled = 0;
        for job in self
            .jobs
            .iter_mut()
            .filter(|j| !j.removed && !j.is_repeating() && j.name == name)
        {
            job.removed = true;
            cancelled += 1;
        }
        self.jobs.retain(|j| !j.removed);
        cancelled
    }

    /// All live jobs in registration order
    pub fn list(&self) -> Vec<JobInfo> {
        self.jobs
            .iter()
            .filter(|j| !j.removed)
            .map(JobInfo::from)
            .collect()
    }

    /// Every live job's task, for running out of band
    ///
    /// Schedules and enabled flags are left untouched.
    pub fn tasks(&self) -> Vec<DueJob<T>> {
        self.jobs
            .iter()
            .filter(|j| !j.removed)
            .map(|j| DueJob {
                id: j.id,
                name: j.name.clone(),
                task: j.task.clone(),
            })
            .collect()
    }

    /// Collect enabled jobs whose fire time has passed and advance schedules
    ///
    /// Disabled jobs are skipped but still advanced. One-shot jobs are dropped
    /// once their time has come, whether or not they fired.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<DueJob<T>> {
        let mut due = Vec::new();

        for job in self.jobs.iter_mut().filter(|j| j.is_due(now)) {
            if job.enabled {
                due.push(DueJob {
                    id: job.id,
                    name: job.name.clone(),
                    task: job.task.clone(),
                });
            }
            job.advance(now);
        }

        self.jobs.retain(|j| !j.removed);
        due
    }

    /// Earliest upcoming fire time among live jobs
    pub fn next_wakeup(&self) -> Option<DateTime<Utc>> {
        self.jobs
            .iter()
            .filter(|j| !j.removed)
            .map(|j| j.next_run)
            .min()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl<T: Clone> Default for JobScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn at(n: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(n)
    }

    fn names(due: &[DueJob<&'static str>]) -> Vec<&'static str> {
        due.iter().map(|d| d.task).collect()
    }

    #[test]
    fn test_repeating_job_fires_on_schedule() {
        let mut scheduler = JobScheduler::new();
        scheduler.schedule_repeating("general", "general", secs(60), secs(20), t0());

        assert!(scheduler.due(at(19)).is_empty());
        assert_eq!(names(&scheduler.due(at(20))), vec!["general"]);
        assert!(scheduler.due(at(21)).is_empty());
        assert_eq!(names(&scheduler.due(at(80))), vec!["general"]);
        assert_eq!(scheduler.list()[0].next_run, Some(at(140)));
    }

    #[test]
    fn test_missed_runs_collapse_into_one() {
        let mut scheduler = JobScheduler::new();
        scheduler.schedule_repeating("up", "up", secs(10), secs(0), t0());

        assert_eq!(scheduler.due(at(55)).len(), 1);
        assert_eq!(scheduler.next_wakeup(), Some(at(60)));
    }

    #[test]
    fn test_disabled_job_keeps_schedule_but_does_not_fire() {
        let mut scheduler = JobScheduler::new();
        let id = scheduler.schedule_repeating("health", "health", secs(60), secs(10), t0());

        assert!(scheduler.set_enabled(id, false));
        assert!(scheduler.due(at(10)).is_empty());
        assert_eq!(scheduler.list()[0].next_run, Some(at(70)));
        assert!(!scheduler.list()[0].enabled);

        scheduler.set_enabled(id, true);
        assert_eq!(names(&scheduler.due(at(70))), vec!["health"]);
    }

    #[test]
    fn test_one_shot_job_fires_once_and_is_removed() {
        let mut scheduler = JobScheduler::new();
        scheduler.schedule_once("wake", "wake", secs(30), t0());

        assert_eq!(scheduler.len(), 1);
        assert_eq!(names(&scheduler.due(at(30))), vec!["wake"]);
        assert!(scheduler.is_empty());
        assert!(scheduler.due(at(90)).is_empty());
    }

    #[test]
    fn test_cancel_by_name_only_touches_one_shot_jobs() {
        let mut scheduler = JobScheduler::new();
        scheduler.schedule_repeating("wake", "periodic", secs(60), secs(60), t0());
        scheduler.schedule_once("wake", "wake-1", secs(100), t0());
        scheduler.schedule_once("wake", "wake-2", secs(200), t0());
        scheduler.schedule_once("daily", "daily", secs(100), t0());

        assert_eq!(scheduler.cancel_by_name("wake"), 2);
        let listed: Vec<_> = scheduler.list().into_iter().map(|j| j.name).collect();
        assert_eq!(listed, vec!["wake", "daily"]);
        assert!(scheduler.list()[0].repeating);
    }

    #[test]
    fn test_tasks_do_not_disturb_schedule() {
        let mut scheduler = JobScheduler::new();
        let id = scheduler.schedule_repeating("health", "health", secs(60), secs(10), t0());
        scheduler.set_enabled(id, false);
        let before = scheduler.list();

        let all = scheduler.tasks();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].task, "health");
        assert_eq!(scheduler.list(), before);
    }

    #[test]
    fn test_out_of_range_delay_never_fires_early() {
        let mut scheduler = JobScheduler::new();
        scheduler.schedule_once("wake", "wake", Duration::MAX, t0());
        scheduler.schedule_once("wake", "wake", secs(u64::MAX / 2), t0());

        assert!(scheduler.due(t0()).is_empty());
        assert!(scheduler.due(at(10 * 365 * 86_400)).is_empty());
        assert_eq!(scheduler.len(), 2);
        assert!(scheduler.next_wakeup().unwrap() > at(10 * 365 * 86_400));
    }

    #[test]
    fn test_set_enabled_on_unknown_job() {
        let mut scheduler: JobScheduler<&str> = JobScheduler::new();
        assert!(!scheduler.set_enabled(42, true));
        assert_eq!(scheduler.is_enabled(42), None);
    }
}
