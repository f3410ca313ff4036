//! The monitoring agent loop
//!
//! A single tokio task owns the scheduler and the [`MonitorContext`]. Each
//! tick it runs due jobs one after another; operator commands arrive over a
//! channel and are handled between ticks, so nothing ever runs concurrently
//! with a job body.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::commands::{
    authorize, what_is_tracked, AdminDirectory, Command, CommandError, SleepScope, HELP_TEXT,
};
use super::context::MonitorContext;
use super::tasks::{JobError, JobOutcome, MonitorTask, PeriodicJob};
use crate::scheduler::{JobId, JobScheduler};
use crate::storage::timestamp::to_epoch;

pub const WAKE_JOB: &str = "wake";

/// An extra daily run is queued when the first one is further off than this
const EARLY_DAILY_CUTOFF_SECS: u64 = 6 * 3600;
const EARLY_DAILY_DELAY: Duration = Duration::from_secs(3600);

/// Seconds until the next 01:00 UTC
///
/// During the midnight hour that is today's 01:00, otherwise tomorrow's.
pub fn seconds_until_daily(now: DateTime<Utc>) -> u64 {
    let since_midnight = u64::from(now.num_seconds_from_midnight());
    if now.hour() == 0 {
        3600 - since_midnight
    } else {
        86_400 - since_midnight + 3600
    }
}

fn first_run(job: PeriodicJob, now: DateTime<Utc>) -> Duration {
    match job {
        PeriodicJob::SystemHealth => Duration::from_secs(15),
        PeriodicJob::UpChecks => Duration::from_secs(200),
        PeriodicJob::DailyChecks => Duration::from_secs(seconds_until_daily(now)),
        PeriodicJob::GeneralLogs => Duration::from_secs(20),
    }
}

pub struct Agent {
    scheduler: JobScheduler<MonitorTask>,
    context: MonitorContext,
    jobs: HashMap<PeriodicJob, JobId>,
    admins: Arc<dyn AdminDirectory>,
}

impl Agent {
    /// Build an agent with the default job schedule starting at `now`
    pub fn new(
        context: MonitorContext,
        admins: Arc<dyn AdminDirectory>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut scheduler = JobScheduler::new();
        let mut jobs = HashMap::new();

        for job in PeriodicJob::ALL {
            let id = scheduler.schedule_repeating(
                job.name(),
                MonitorTask::Run(job),
                job.interval(),
                first_run(job, now),
                now,
            );
            jobs.insert(job, id);
        }

        if seconds_until_daily(now) > EARLY_DAILY_CUTOFF_SECS {
            scheduler.schedule_once(
                PeriodicJob::DailyChecks.name(),
                MonitorTask::Run(PeriodicJob::DailyChecks),
                EARLY_DAILY_DELAY,
                now,
            );
        }

        Self {
            scheduler,
            context,
            jobs,
            admins,
        }
    }

    pub fn context(&self) -> &MonitorContext {
        &self.context
    }

    pub fn scheduler(&self) -> &JobScheduler<MonitorTask> {
        &self.scheduler
    }

    pub fn job_id(&self, job: PeriodicJob) -> Option<JobId> {
        self.jobs.get(&job).copied()
    }

    /// Run every job due at `now`; returns how many ran
    pub async fn tick(&mut self, now: DateTime<Utc>) -> usize {
        let due = self.scheduler.due(now);
        let ran = due.len();
        for job in due {
            self.run_logged(&job.name, job.task, now).await;
        }
        ran
    }

    pub async fn run_task(
        &mut self,
        task: MonitorTask,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, JobError> {
        match task {
            MonitorTask::Run(job) => self.context.run_job(job, now).await,
            MonitorTask::Wake(scope) => {
                tracing::info!(scope = ?scope, "Waking up jobs");
                self.set_scope_enabled(scope, true);
                self.context.run_job(PeriodicJob::DailyChecks, now).await
            }
        }
    }

    /// Run every scheduled job once, out of band
    ///
    /// Failures are logged and the batch carries on. Pending wake-ups are
    /// left alone. Returns (ran, failed).
    pub async fn run_all_now(&mut self, now: DateTime<Utc>) -> (usize, usize) {
        let mut ran = 0;
        let mut failed = 0;
        for job in self.scheduler.tasks() {
            if matches!(job.task, MonitorTask::Wake(_)) {
                continue;
            }
            ran += 1;
            if !self.run_logged(&job.name, job.task, now).await {
                failed += 1;
            }
        }
        (ran, failed)
    }

    async fn run_logged(&mut self, name: &str, task: MonitorTask, now: DateTime<Utc>) -> bool {
        tracing::debug!(job = %name, "Running job");
        match self.run_task(task, now).await {
            Ok(outcome) => {
                if let Some(note) = outcome.note {
                    tracing::info!(job = %name, note = %note.trim_end(), "Job had nothing to do");
                }
                true
            }
            Err(e) => {
                tracing::error!(job = %name, error = %e, "Job failed");
                false
            }
        }
    }

    /// Parse, authorize and execute an operator command
    pub async fn handle(
        &mut self,
        caller: &str,
        name: &str,
        args: &[String],
        now: DateTime<Utc>,
    ) -> Result<String, CommandError> {
        let command = Command::parse(name, args)?;
        authorize(caller, &command, self.admins.as_ref())?;
        tracing::info!(caller = %caller, command = command.name(), "Running operator command");
        Ok(self.execute(command, now).await)
    }

    pub async fn execute(&mut self, command: Command, now: DateTime<Utc>) -> String {
        match command {
            Command::Start => {
                self.set_scope_enabled(SleepScope::All, true);
                let mut reply = String::from("Starting logs.");
                if let Err(e) = self.context.run_job(PeriodicJob::DailyChecks, now).await {
                    tracing::error!(error = %e, "Daily checks failed on start");
                    reply.push_str(&format!("\n{}", e));
                }
                reply
            }
            Command::Stop(scope) => {
                self.set_scope_enabled(scope, false);
                scope.stop_reply().to_string()
            }
            Command::Reset => {
                self.context.cursors.reset_all();
                "Resetting checked timestamp to 0".to_string()
            }
            Command::MoveToEnd => {
                self.context.cursors.move_all_to(to_epoch(now));
                "Resetting checked timestamp to end".to_string()
            }
            Command::Clear => match self.context.notifier().clear_sent().await {
                Ok(deleted) => format!("Deleted {} messages.", deleted),
                Err(e) => format!("Failed to delete messages: {}", e),
            },
            Command::WhatIsTracked => what_is_tracked(&self.context.links),
            Command::Sleep { seconds, scope } => {
                self.set_scope_enabled(scope, false);
                self.scheduler.cancel_by_name(WAKE_JOB);
                self.scheduler.schedule_once(
                    WAKE_JOB,
                    MonitorTask::Wake(scope),
                    Duration::from_secs(seconds),
                    now,
                );
                format!("{}\nsleeping for {} seconds", scope.stop_reply(), seconds)
            }
            Command::Jobs => self.render_jobs(),
            Command::RunJobs => {
                let (ran, failed) = self.run_all_now(now).await;
                format!("Ran {} jobs ({} failed).", ran, failed)
            }
            Command::Help => HELP_TEXT.to_string(),
        }
    }

    fn set_scope_enabled(&mut self, scope: SleepScope, enabled: bool) {
        for job in scope.jobs() {
            if let Some(id) = self.jobs.get(job) {
                self.scheduler.set_enabled(*id, enabled);
            }
        }
    }

    fn render_jobs(&self) -> String {
        self.scheduler
            .list()
            .iter()
            .map(|job| {
                let mark = if job.enabled { "✅" } else { "❎" };
                match job.next_run {
                    Some(next) => format!(
                        "{} {}, at {}",
                        mark,
                        job.name,
                        next.format("%Y-%m-%d %H:%M:%S UTC")
                    ),
                    None => format!("{} {}", mark, job.name),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Spawn the agent loop
    pub fn start(mut self, tick_every: Duration) -> RunningAgent {
        let (control_tx, mut control_rx) = mpsc::channel::<ControlMessage>(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut ticker = interval(tick_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(jobs = self.scheduler.len(), "Monitoring agent started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick(Utc::now()).await;
                    }
                    Some(message) = control_rx.recv() => {
                        let result = self
                            .handle(&message.caller, &message.command, &message.args, Utc::now())
                            .await;
                        let _ = message.reply.send(result);
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Monitoring agent shutting down");
                        break;
                    }
                }
            }
        });

        RunningAgent {
            handle: AgentHandle { control: control_tx },
            shutdown_tx,
            task,
        }
    }
}

/// An operator command on its way to the agent loop
#[derive(Debug)]
pub struct ControlMessage {
    pub caller: String,
    pub command: String,
    pub args: Vec<String>,
    pub reply: oneshot::Sender<Result<String, CommandError>>,
}

/// Cloneable sender side of the agent's control channel
#[derive(Debug, Clone)]
pub struct AgentHandle {
    control: mpsc::Sender<ControlMessage>,
}

impl AgentHandle {
    pub async fn command(
        &self,
        caller: &str,
        command: &str,
        args: Vec<String>,
    ) -> Result<String, CommandError> {
        let (reply, response) = oneshot::channel();
        self.control
            .send(ControlMessage {
                caller: caller.to_string(),
                command: command.to_string(),
                args,
                reply,
            })
            .await
            .map_err(|_| CommandError::AgentUnavailable)?;
        response.await.map_err(|_| CommandError::AgentUnavailable)?
    }
}

pub struct RunningAgent {
    pub handle: AgentHandle,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl RunningAgent {
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::commands::StaticAdmins;
    use crate::monitor::testing::{context_in, RecordingNotifier};
    use crate::scheduler::MAX_SLEEP_SECS;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    fn agent(dir: &TempDir, now: DateTime<Utc>) -> Agent {
        let ctx = context_in(dir.path(), RecordingNotifier::new(), 20);
        Agent::new(ctx, Arc::new(StaticAdmins::new(["42"])), now)
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_seconds_until_daily() {
        assert_eq!(seconds_until_daily(utc(0, 30)), 1800);
        assert_eq!(seconds_until_daily(utc(1, 0)), 86_400);
        assert_eq!(seconds_until_daily(utc(23, 0)), 7200);
    }

    #[test]
    fn test_default_schedule() {
        let dir = TempDir::new().unwrap();

        let near = agent(&dir, utc(0, 30));
        let names: Vec<String> = near.scheduler().list().into_iter().map(|j| j.name).collect();
        assert_eq!(
            names,
            vec!["check_system_health", "server_up_checks", "daily_checks", "check_general_logs"]
        );

        let far = agent(&dir, utc(12, 0));
        let jobs = far.scheduler().list();
        assert_eq!(jobs.len(), 5);
        assert_eq!(jobs[4].name, "daily_checks");
        assert!(!jobs[4].repeating);
        assert_eq!(jobs[4].next_run, Some(utc(13, 0)));
    }

    #[tokio::test]
    async fn test_tick_runs_due_jobs() {
        let dir = TempDir::new().unwrap();
        let start = utc(0, 30);
        let mut agent = agent(&dir, start);

        assert_eq!(agent.tick(start + chrono::Duration::seconds(10)).await, 0);
        assert_eq!(agent.tick(start + chrono::Duration::seconds(21)).await, 2);
        assert_eq!(agent.tick(start + chrono::Duration::seconds(22)).await, 0);
    }

    #[tokio::test]
    async fn test_privileged_commands_need_admin() {
        let dir = TempDir::new().unwrap();
        let now = utc(0, 30);
        let mut agent = agent(&dir, now);

        assert!(matches!(
            agent.handle("7", "stop", &[], now).await,
            Err(CommandError::Unauthorized { .. })
        ));
        assert_eq!(agent.handle("7", "help", &[], now).await.unwrap(), HELP_TEXT);
    }

    #[tokio::test]
    async fn test_stop_scopes() {
        let dir = TempDir::new().unwrap();
        let now = utc(0, 30);
        let mut agent = agent(&dir, now);
        let up = agent.job_id(PeriodicJob::UpChecks).unwrap();
        let general = agent.job_id(PeriodicJob::GeneralLogs).unwrap();

        let reply = agent.handle("42", "stop", &args(&["up_check"]), now).await.unwrap();
        assert_eq!(reply, "Stopping server-up checks.");
        assert_eq!(agent.scheduler().is_enabled(up), Some(false));
        assert_eq!(agent.scheduler().is_enabled(general), Some(true));

        agent.handle("42", "stop", &[], now).await.unwrap();
        assert_eq!(agent.scheduler().is_enabled(general), Some(false));

        assert_eq!(agent.handle("42", "start", &[], now).await.unwrap(), "Starting logs.");
        assert_eq!(agent.scheduler().is_enabled(up), Some(true));
        assert_eq!(agent.scheduler().is_enabled(general), Some(true));
    }

    #[tokio::test]
    async fn test_sleep_then_wake() {
        let dir = TempDir::new().unwrap();
        let now = utc(0, 30);
        let mut agent = agent(&dir, now);
        let health = agent.job_id(PeriodicJob::SystemHealth).unwrap();
        let general = agent.job_id(PeriodicJob::GeneralLogs).unwrap();

        let reply = agent
            .handle("42", "sleep", &args(&["h=1", "non-daily"]), now)
            .await
            .unwrap();
        assert_eq!(reply, "Stopping all non-daily logs\nsleeping for 3600 seconds");
        assert_eq!(agent.scheduler().is_enabled(health), Some(false));
        assert_eq!(agent.scheduler().is_enabled(general), Some(true));

        // A second sleep replaces the pending wake-up
        agent.handle("42", "sleep", &args(&["m=1", "non-daily"]), now).await.unwrap();
        let wakes = agent
            .scheduler()
            .list()
            .into_iter()
            .filter(|j| j.name == WAKE_JOB)
            .count();
        assert_eq!(wakes, 1);

        agent.tick(now + chrono::Duration::seconds(61)).await;
        assert_eq!(agent.scheduler().is_enabled(health), Some(true));
        assert!(agent.scheduler().list().iter().all(|j| j.name != WAKE_JOB));
    }

    #[tokio::test]
    async fn test_huge_sleep_is_capped_and_keeps_jobs_asleep() {
        let dir = TempDir::new().unwrap();
        let now = utc(0, 30);
        let mut agent = agent(&dir, now);
        let health = agent.job_id(PeriodicJob::SystemHealth).unwrap();

        let reply = agent
            .handle("42", "sleep", &args(&["d=100000000"]), now)
            .await
            .unwrap();
        assert!(reply.ends_with(&format!("sleeping for {} seconds", MAX_SLEEP_SECS)));

        agent
            .handle("42", "sleep", &args(&["s=18446744073709551615"]), now)
            .await
            .unwrap();
        agent.tick(now).await;
        assert_eq!(agent.scheduler().is_enabled(health), Some(false));

        agent.tick(now + chrono::Duration::days(30)).await;
        assert_eq!(agent.scheduler().is_enabled(health), Some(false));
        let wake = agent
            .scheduler()
            .list()
            .into_iter()
            .find(|j| j.name == WAKE_JOB)
            .unwrap();
        assert_eq!(
            wake.next_run,
            Some(now + chrono::Duration::seconds(MAX_SLEEP_SECS as i64))
        );
    }

    #[tokio::test]
    async fn test_run_jobs_leaves_schedule_alone() {
        let dir = TempDir::new().unwrap();
        let now = utc(0, 30);
        let mut agent = agent(&dir, now);
        let before = agent.scheduler().list();

        let reply = agent.handle("42", "run_jobs", &[], now).await.unwrap();
        assert_eq!(reply, "Ran 4 jobs (0 failed).");
        assert_eq!(agent.scheduler().list(), before);
    }

    #[tokio::test]
    async fn test_reset_and_move_to_end() {
        let dir = TempDir::new().unwrap();
        let now = utc(0, 30);
        let mut agent = agent(&dir, now);

        let reply = agent.handle("42", "move_to_end", &[], now).await.unwrap();
        assert_eq!(reply, "Resetting checked timestamp to end");
        assert_eq!(agent.context().cursors.get("general_logs"), to_epoch(now));

        let reply = agent.handle("42", "reset", &[], now).await.unwrap();
        assert_eq!(reply, "Resetting checked timestamp to 0");
        assert_eq!(agent.context().cursors.get("general_logs"), 0.0);
    }

    #[tokio::test]
    async fn test_agent_loop_answers_commands() {
        let dir = TempDir::new().unwrap();
        let running = agent(&dir, Utc::now()).start(Duration::from_millis(50));

        let reply = running.handle.command("42", "jobs", Vec::new()).await.unwrap();
        assert!(reply.contains("✅ check_general_logs, at "));

        let handle = running.handle.clone();
        running.stop().await;
        assert!(matches!(
            handle.command("42", "help", Vec::new()).await,
            Err(CommandError::AgentUnavailable)
        ));
    }
}
