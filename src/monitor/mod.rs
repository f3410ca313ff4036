//! Scheduled monitoring: job bodies, operator commands and the agent loop

pub mod agent;
pub mod commands;
pub mod context;
pub mod daily;
pub mod tasks;
pub mod uptime;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{seconds_until_daily, Agent, AgentHandle, RunningAgent};
pub use commands::{AdminDirectory, Command, CommandError, SleepScope, StaticAdmins};
pub use context::{Cursors, Delivery, Destinations, MonitorContext};
pub use daily::{DailyChecks, DailyReport, NoDailyChecks};
pub use tasks::{JobError, JobOutcome, MonitorTask, PeriodicJob};
