//! Heartbeat throttling
//!
//! Heartbeats for a category go out at most once per wait period. Categories
//! that have never sent count from agent startup, and categories without a
//! configured period wait one day.

use std::collections::HashMap;

pub const DEFAULT_WAIT_PERIOD_SECS: u64 = 24 * 3600;

#[derive(Debug, Clone)]
pub struct HeartbeatThrottle {
    started_at: f64,
    last_sent: HashMap<String, f64>,
    wait_periods: HashMap<String, u64>,
}

impl HeartbeatThrottle {
    pub fn new(wait_periods: HashMap<String, u64>, started_at: f64) -> Self {
        Self {
            started_at,
            last_sent: HashMap::new(),
            wait_periods,
        }
    }

    /// Configured wait period for `category`
    pub fn wait_period(&self, category: &str) -> u64 {
        self.wait_periods
            .get(category)
            .copied()
            .unwrap_or(DEFAULT_WAIT_PERIOD_SECS)
    }

    /// Last send time, or agent startup if nothing was sent yet
    pub fn last_sent(&self, category: &str) -> f64 {
        self.last_sent
            .get(category)
            .copied()
            .unwrap_or(self.started_at)
    }

    pub fn should_send(&self, category: &str, now: f64) -> bool {
        self.last_sent(category) + (self.wait_period(category) as f64) < now
    }

    pub fn mark_sent(&mut self, category: &str, now: f64) {
        self.last_sent.insert(category.to_string(), now);
    }
}
