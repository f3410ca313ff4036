//! State shared by every monitoring job
//!
//! Cursors and heartbeat bookkeeping live here instead of in globals; the
//! agent owns one context and lends it to each job in turn.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::alerts::{HeartbeatThrottle, Notifier, ThresholdEvaluator};

use super::daily::DailyChecks;

/// Per-category scan cursors (epoch seconds)
#[derive(Debug, Clone, Default)]
pub struct Cursors(BTreeMap<String, f64>);

impl Cursors {
    /// Cursors for `categories`, all starting at 0
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(categories.into_iter().map(|c| (c.into(), 0.0)).collect())
    }

    pub fn get(&self, category: &str) -> f64 {
        self.0.get(category).copied().unwrap_or(0.0)
    }

    /// Move a cursor forward to `candidate`; never moves it back
    pub fn advance(&mut self, category: &str, candidate: f64) -> f64 {
        let cursor = self.0.entry(category.to_string()).or_insert(0.0);
        if candidate > *cursor {
            *cursor = candidate;
        }
        *cursor
    }

    /// Re-evaluate everything on the next scan
    pub fn reset_all(&mut self) {
        for cursor in self.0.values_mut() {
            *cursor = 0.0;
        }
    }

    /// Skip everything logged up to `now`
    pub fn move_all_to(&mut self, now: f64) {
        for cursor in self.0.values_mut() {
            *cursor = now;
        }
    }
}

/// Where alarms and heartbeats go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destinations {
    pub alarm: String,
    pub heartbeat: String,
}

/// What a delivery attempt actually sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub heartbeat_sent: bool,
    pub alarm_sent: bool,
}

pub struct MonitorContext {
    pub cursors: Cursors,
    pub throttle: HeartbeatThrottle,
    pub evaluator: ThresholdEvaluator,
    pub links: Vec<String>,
    pub destinations: Destinations,
    notifier: Arc<dyn Notifier>,
    daily: Arc<dyn DailyChecks>,
    http: reqwest::Client,
    bot_directory: std::path::PathBuf,
}

impl MonitorContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bot_directory: impl Into<std::path::PathBuf>,
        cursors: Cursors,
        throttle: HeartbeatThrottle,
        evaluator: ThresholdEvaluator,
        links: Vec<String>,
        destinations: Destinations,
        notifier: Arc<dyn Notifier>,
        daily: Arc<dyn DailyChecks>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            cursors,
            throttle,
            evaluator,
            links,
            destinations,
            notifier,
            daily,
            http,
            bot_directory: bot_directory.into(),
        }
    }

    pub fn bot_directory(&self) -> &Path {
        &self.bot_directory
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub(crate) fn daily_checks_plugin(&self) -> Arc<dyn DailyChecks> {
        Arc::clone(&self.daily)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Send `heartbeat` if its category is due and `alarm` unconditionally
    ///
    /// Transport failures are logged and dropped.
    pub async fn deliver(
        &mut self,
        category: &str,
        heartbeat: &str,
        alarm: &str,
        now: f64,
    ) -> Delivery {
        let mut delivery = Delivery::default();

        if !heartbeat.trim().is_empty() && self.throttle.should_send(category, now) {
            delivery.heartbeat_sent = self.send_heartbeat(heartbeat).await;
            self.throttle.mark_sent(category, now);
        }

        if !alarm.trim().is_empty() {
            delivery.alarm_sent = self.send_alarm(alarm).await;
        }

        delivery
    }

    /// Send to the heartbeat destination, bypassing the throttle
    pub async fn send_heartbeat(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let destination = self.destinations.heartbeat.clone();
        self.send(&destination, text).await
    }

    pub async fn send_alarm(&self, text: &str) -> bool {
        let destination = self.destinations.alarm.clone();
        self.send(&destination, text).await
    }

    async fn send(&self, destination: &str, text: &str) -> bool {
        match self.notifier.send(destination, text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    notifier = %self.notifier.name(),
                    destination = %destination,
                    error = %e,
                    "Failed to send notification"
                );
                false
            }
        }
    }
}
