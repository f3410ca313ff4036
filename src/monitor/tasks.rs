//! Periodic monitoring jobs

use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use super::commands::SleepScope;
use super::context::{Delivery, MonitorContext};
use super::uptime::{check_links, render_up_checks};
use crate::alerts::notifier::{split_message, MAX_MESSAGE_CHARS};
use crate::config::{GENERAL_LOGS, HEALTH_LOGS};
use crate::storage::timestamp::to_epoch;

/// Heartbeat categories
pub const SERVER_HEALTH_HEARTBEAT: &str = "server_health_logs";
pub const UP_CHECKS_HEARTBEAT: &str = "up_checks";
pub const DAILY_CHECKS_HEARTBEAT: &str = "daily_checks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodicJob {
    SystemHealth,
    UpChecks,
    DailyChecks,
    GeneralLogs,
}

impl PeriodicJob {
    pub const ALL: [PeriodicJob; 4] = [
        PeriodicJob::SystemHealth,
        PeriodicJob::UpChecks,
        PeriodicJob::DailyChecks,
        PeriodicJob::GeneralLogs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PeriodicJob::SystemHealth => "check_system_health",
            PeriodicJob::UpChecks => "server_up_checks",
            PeriodicJob::DailyChecks => "daily_checks",
            PeriodicJob::GeneralLogs => "check_general_logs",
        }
    }

    pub fn interval(self) -> Duration {
        match self {
            PeriodicJob::SystemHealth => Duration::from_secs(3600),
            PeriodicJob::UpChecks => Duration::from_secs(300),
            PeriodicJob::DailyChecks => Duration::from_secs(86_400),
            PeriodicJob::GeneralLogs => Duration::from_secs(60),
        }
    }
}

/// What the scheduler queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorTask {
    Run(PeriodicJob),
    /// End of an operator sleep
    Wake(SleepScope),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutcome {
    pub delivery: Delivery,
    /// Informational note, e.g. when there was nothing to scan
    pub note: Option<String>,
}

impl JobOutcome {
    fn delivered(delivery: Delivery) -> Self {
        Self {
            delivery,
            note: None,
        }
    }

    fn note(note: String) -> Self {
        Self {
            delivery: Delivery::default(),
            note: Some(note),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Daily checks failed: {0}")]
    DailyChecks(String),
}

impl MonitorContext {
    pub async fn run_job(
        &mut self,
        job: PeriodicJob,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, JobError> {
        match job {
            PeriodicJob::GeneralLogs => Ok(self.check_general_logs(now).await),
            PeriodicJob::SystemHealth => Ok(self.check_system_health(now).await),
            PeriodicJob::UpChecks => Ok(self.server_up_checks(now).await),
            PeriodicJob::DailyChecks => self.daily_checks(now).await,
        }
    }

    /// Keyword scan of general logs newer than the cursor
    pub async fn check_general_logs(&mut self, now: DateTime<Utc>) -> JobOutcome {
        let cursor = self.cursors.get(GENERAL_LOGS);
        let evaluation = self.evaluator.evaluate_keywords(GENERAL_LOGS, cursor);
        if evaluation.sources == 0 && evaluation.alarm.is_empty() {
            return JobOutcome::note(format!("no {} logs found\n", GENERAL_LOGS));
        }

        self.cursors.advance(GENERAL_LOGS, evaluation.cursor);
        let delivery = self
            .deliver(
                GENERAL_LOGS,
                &evaluation.heartbeat,
                &evaluation.alarm,
                to_epoch(now),
            )
            .await;
        JobOutcome::delivered(delivery)
    }

    /// Threshold and staleness check of the newest health record per source
    pub async fn check_system_health(&mut self, now: DateTime<Utc>) -> JobOutcome {
        let cursor = self.cursors.get(HEALTH_LOGS);
        let evaluation =
            self.evaluator
                .evaluate_thresholds(HEALTH_LOGS, cursor, SystemTime::from(now));
        if evaluation.sources == 0 && evaluation.alarm.is_empty() {
            return JobOutcome::note(format!("no {} logs found\n", HEALTH_LOGS));
        }

        let delivery = self
            .deliver(
                SERVER_HEALTH_HEARTBEAT,
                &evaluation.heartbeat,
                &evaluation.alarm,
                to_epoch(now),
            )
            .await;
        JobOutcome::delivered(delivery)
    }

    pub async fn server_up_checks(&mut self, now: DateTime<Utc>) -> JobOutcome {
        if self.links.is_empty() {
            return JobOutcome::default();
        }

        let statuses = check_links(self.http(), &self.links).await;
        let (alarm, heartbeat) = render_up_checks(&statuses);
        let delivery = self
            .deliver(UP_CHECKS_HEARTBEAT, &heartbeat, &alarm, to_epoch(now))
            .await;
        JobOutcome::delivered(delivery)
    }

    /// Run the installed daily checks; long alerts go out in chunks
    pub async fn daily_checks(&mut self, now: DateTime<Utc>) -> Result<JobOutcome, JobError> {
        let checks = self.daily_checks_plugin();
        let report = checks
            .run_daily_checks(self)
            .await
            .map_err(JobError::DailyChecks)?;

        let mut delivery = Delivery::default();
        for alert in &report.alerts {
            for chunk in split_message(alert, MAX_MESSAGE_CHARS) {
                delivery.alarm_sent |= self.send_alarm(&chunk).await;
            }
        }

        let mut heartbeat = String::from("Daily checks finished");
        if !report.heartbeats.is_empty() {
            heartbeat.push_str("\n\nCustom heartbeat messages:\n\n  ");
            heartbeat.push_str(&report.heartbeats.join("\n  "));
        }
        let sent = self
            .deliver(DAILY_CHECKS_HEARTBEAT, &heartbeat, "", to_epoch(now))
            .await;
        delivery.heartbeat_sent = sent.heartbeat_sent;

        Ok(JobOutcome::delivered(delivery))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::daily::DailyReport;
    use crate::monitor::testing::{context_in, context_with_daily, FixedDailyChecks, RecordingNotifier};
    use crate::storage::timestamp::epoch_to_datetime;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn at(secs: f64) -> DateTime<Utc> {
        epoch_to_datetime(secs).unwrap()
    }

    #[tokio::test]
    async fn test_general_logs_without_sources() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context_in(dir.path(), RecordingNotifier::new(), 20);

        let outcome = ctx.check_general_logs(at(1_000.0)).await;
        assert_eq!(outcome.note.as_deref(), Some("no general_logs logs found\n"));
    }

    #[tokio::test]
    async fn test_general_logs_alarm_and_cursor() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("general_logs.web-1.json"),
            r#"{"500.0": {"note": "rotated"}, "600.0": {"error": "disk full"}}"#,
        )
        .unwrap();
        let notifier = RecordingNotifier::new();
        let mut ctx = context_in(dir.path(), notifier.clone(), 20);

        let outcome = ctx.check_general_logs(at(1_000.0)).await;
        assert!(outcome.delivery.alarm_sent);
        assert!(outcome.delivery.heartbeat_sent);
        assert_eq!(ctx.cursors.get(GENERAL_LOGS), 600.0);

        let alarms = notifier.to("alarm");
        assert_eq!(alarms.len(), 1);
        assert!(alarms[0].starts_with("web-1:\n"));
        assert!(alarms[0].contains("error: disk full"));

        // Nothing new past the cursor: no second alarm
        let outcome = ctx.check_general_logs(at(1_010.0)).await;
        assert!(!outcome.delivery.alarm_sent);
        assert_eq!(notifier.to("alarm").len(), 1);
    }

    #[tokio::test]
    async fn test_system_health_threshold_alarm() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("health_logs.db-1.json");
        std::fs::write(&path, r#"{"100.0": {"disk_usage": 97}}"#).unwrap();
        let notifier = RecordingNotifier::new();
        let mut ctx = context_in(dir.path(), notifier.clone(), 20);

        let now = DateTime::<Utc>::from(std::fs::metadata(&path).unwrap().modified().unwrap());
        let outcome = ctx.check_system_health(now).await;
        assert!(outcome.delivery.alarm_sent);

        let alarms = notifier.to("alarm");
        assert_eq!(alarms.len(), 1);
        assert!(alarms[0].contains("db-1 ==>  disk_usage (97) exceeds threshold (95)"));
        assert!(!alarms[0].contains("has not been updated"));
    }

    #[tokio::test]
    async fn test_up_checks_skip_without_links() {
        let dir = TempDir::new().unwrap();
        let notifier = RecordingNotifier::new();
        let mut ctx = context_in(dir.path(), notifier.clone(), 20);

        let outcome = ctx.server_up_checks(at(1_000.0)).await;
        assert_eq!(outcome, JobOutcome::default());
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_daily_checks_chunk_long_alerts() {
        let dir = TempDir::new().unwrap();
        let notifier = RecordingNotifier::new();
        let report = DailyReport {
            alerts: vec!["x".repeat(MAX_MESSAGE_CHARS + 10)],
            heartbeats: vec!["backups ok".to_string()],
        };
        let mut ctx = context_with_daily(
            dir.path(),
            notifier.clone(),
            20,
            Arc::new(FixedDailyChecks(Ok(report))),
        );

        let outcome = ctx.daily_checks(at(1_000.0)).await.unwrap();
        assert!(outcome.delivery.alarm_sent);
        assert!(outcome.delivery.heartbeat_sent);

        let alarms = notifier.to("alarm");
        assert_eq!(alarms.len(), 2);
        assert_eq!(alarms[0].chars().count(), MAX_MESSAGE_CHARS);
        assert_eq!(alarms[1].chars().count(), 10);

        let heartbeats = notifier.to("heartbeat");
        assert!(heartbeats[0].starts_with("Daily checks finished"));
        assert!(heartbeats[0].contains("backups ok"));
    }

    #[tokio::test]
    async fn test_daily_checks_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context_with_daily(
            dir.path(),
            RecordingNotifier::new(),
            20,
            Arc::new(FixedDailyChecks(Err("backup host unreachable".to_string()))),
        );

        let err = ctx.daily_checks(at(1_000.0)).await.unwrap_err();
        assert_eq!(err.to_string(), "Daily checks failed: backup host unreachable");
    }
}
