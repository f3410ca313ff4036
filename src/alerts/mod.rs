//! Alarm evaluation, heartbeat throttling and notification transports
//!
//! Log stores are evaluated either by keyword (general logs) or against
//! numeric thresholds (health logs). Heartbeat text is gated per category by
//! [`HeartbeatThrottle`]; alarm text is always delivered.

pub mod config;
pub mod evaluator;
pub mod notifier;
pub mod throttle;

pub use config::{AlarmKeywords, ThresholdRule, HEALTH_STALENESS_WINDOW};
pub use evaluator::{Evaluation, ThresholdEvaluator};
pub use notifier::{LogNotifier, NotificationError, Notifier, TelegramNotifier};
pub use throttle::HeartbeatThrottle;
