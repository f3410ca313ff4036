//! Pluggable daily checks

use async_trait::async_trait;

use super::context::MonitorContext;

/// Output of a daily check run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyReport {
    pub alerts: Vec<String>,
    pub heartbeats: Vec<String>,
}

/// Site-specific checks run once a day, injected at startup
#[async_trait]
pub trait DailyChecks: Send + Sync {
    async fn run_daily_checks(&self, ctx: &MonitorContext) -> Result<DailyReport, String>;
}

/// Used when no daily checks are installed
#[derive(Debug, Default)]
pub struct NoDailyChecks;

#[async_trait]
impl DailyChecks for NoDailyChecks {
    async fn run_daily_checks(&self, _ctx: &MonitorContext) -> Result<DailyReport, String> {
        Ok(DailyReport::default())
    }
}
