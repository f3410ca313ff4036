//! Fakes shared by monitor tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::context::{Cursors, Destinations, MonitorContext};
use super::daily::{DailyChecks, DailyReport, NoDailyChecks};
use crate::alerts::config::default_health_rules;
use crate::alerts::{
    AlarmKeywords, HeartbeatThrottle, NotificationError, Notifier, ThresholdEvaluator,
    HEALTH_STALENESS_WINDOW,
};
use crate::config::{GENERAL_LOGS, HEALTH_LOGS};

/// Notifier that keeps every message it is asked to send
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// (destination, text) pairs in send order
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().clone()
    }

    pub fn to(&self, destination: &str) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(d, _)| d == destination)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), NotificationError> {
        self.messages
            .lock()
            .push((destination.to_string(), text.to_string()));
        Ok(())
    }

    async fn clear_sent(&self) -> Result<usize, NotificationError> {
        let mut messages = self.messages.lock();
        let cleared = messages.len();
        messages.clear();
        Ok(cleared)
    }
}

/// Daily checks returning a fixed report, or failing
pub struct FixedDailyChecks(pub Result<DailyReport, String>);

#[async_trait]
impl DailyChecks for FixedDailyChecks {
    async fn run_daily_checks(&self, _ctx: &MonitorContext) -> Result<DailyReport, String> {
        self.0.clone()
    }
}

/// Context over `dir` whose heartbeats are due once `wait_secs` past epoch 0
pub fn context_in(dir: &Path, notifier: RecordingNotifier, wait_secs: u64) -> MonitorContext {
    context_with_daily(dir, notifier, wait_secs, Arc::new(NoDailyChecks))
}

pub fn context_with_daily(
    dir: &Path,
    notifier: RecordingNotifier,
    wait_secs: u64,
    daily: Arc<dyn DailyChecks>,
) -> MonitorContext {
    let wait_periods: HashMap<String, u64> = [
        GENERAL_LOGS,
        "server_health_logs",
        "up_checks",
        "daily_checks",
    ]
    .iter()
    .map(|c| (c.to_string(), wait_secs))
    .collect();

    MonitorContext::new(
        dir,
        Cursors::new([GENERAL_LOGS, HEALTH_LOGS]),
        HeartbeatThrottle::new(wait_periods, 0.0),
        ThresholdEvaluator::new(
            dir,
            AlarmKeywords::default(),
            default_health_rules(),
            HEALTH_STALENESS_WINDOW,
        ),
        Vec::new(),
        Destinations {
            alarm: "alarm".to_string(),
            heartbeat: "heartbeat".to_string(),
        },
        Arc::new(notifier),
        daily,
        reqwest::Client::new(),
    )
}
