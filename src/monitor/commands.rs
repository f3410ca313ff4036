//! Operator commands and the admin guard

use std::collections::HashSet;

use super::tasks::PeriodicJob;
use crate::scheduler::parse_sleep_seconds;

pub const HELP_TEXT: &str = "\
/help displays help messages
/start starts all jobs
/stop stops all jobs (/stop non-daily, /stop up_check)
/reset resets log positions to 0
/move_to_end moves log positions to end
/clear deletes bot messages from last start
/what_is_tracked gives details about what is tracked
/sleep pause all jobs. Example: /sleep d=7 h=1 m=5 s=30
/jobs lists all scheduled jobs
/run_jobs runs all tasks now, doesn't affect scheduling
";

/// Which jobs a stop or sleep applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SleepScope {
    NonDaily,
    UpCheck,
    All,
}

impl SleepScope {
    pub fn from_args(args: &[String]) -> Self {
        if args.iter().any(|a| a == "non-daily") {
            SleepScope::NonDaily
        } else if args.iter().any(|a| a == "up_check") {
            SleepScope::UpCheck
        } else {
            SleepScope::All
        }
    }

    pub fn jobs(self) -> &'static [PeriodicJob] {
        match self {
            SleepScope::NonDaily => &[PeriodicJob::SystemHealth, PeriodicJob::UpChecks],
            SleepScope::UpCheck => &[PeriodicJob::UpChecks],
            SleepScope::All => &PeriodicJob::ALL,
        }
    }

    pub fn stop_reply(self) -> &'static str {
        match self {
            SleepScope::NonDaily => "Stopping all non-daily logs",
            SleepScope::UpCheck => "Stopping server-up checks.",
            SleepScope::All => "Stopping logs.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop(SleepScope),
    Reset,
    MoveToEnd,
    Clear,
    WhatIsTracked,
    Sleep { seconds: u64, scope: SleepScope },
    Jobs,
    RunJobs,
    Help,
}

impl Command {
    /// Parse a command name (leading `/` optional) and its arguments
    pub fn parse(name: &str, args: &[String]) -> Result<Self, CommandError> {
        let command = match name.trim().trim_start_matches('/') {
            "start" => Command::Start,
            "stop" => Command::Stop(SleepScope::from_args(args)),
            "reset" => Command::Reset,
            "move_to_end" => Command::MoveToEnd,
            "clear" => Command::Clear,
            "what_is_tracked" => Command::WhatIsTracked,
            "sleep" => Command::Sleep {
                seconds: parse_sleep_seconds(args.iter().map(String::as_str)),
                scope: SleepScope::from_args(args),
            },
            "jobs" => Command::Jobs,
            "run_jobs" => Command::RunJobs,
            "help" => Command::Help,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Stop(_) => "stop",
            Command::Reset => "reset",
            Command::MoveToEnd => "move_to_end",
            Command::Clear => "clear",
            Command::WhatIsTracked => "what_is_tracked",
            Command::Sleep { .. } => "sleep",
            Command::Jobs => "jobs",
            Command::RunJobs => "run_jobs",
            Command::Help => "help",
        }
    }

    pub fn requires_admin(&self) -> bool {
        !matches!(self, Command::Help | Command::WhatIsTracked)
    }
}

/// Source of truth for who may run privileged commands
pub trait AdminDirectory: Send + Sync {
    fn is_admin(&self, caller: &str) -> bool;
}

/// Fixed list of admin ids
#[derive(Debug, Clone, Default)]
pub struct StaticAdmins(HashSet<String>);

impl StaticAdmins {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ids.into_iter().map(Into::into).collect())
    }
}

impl AdminDirectory for StaticAdmins {
    fn is_admin(&self, caller: &str) -> bool {
        self.0.contains(caller)
    }
}

/// Reject privileged commands from callers that are not admins
pub fn authorize(
    caller: &str,
    command: &Command,
    admins: &dyn AdminDirectory,
) -> Result<(), CommandError> {
    if command.requires_admin() && !admins.is_admin(caller) {
        tracing::warn!(caller = %caller, command = command.name(), "Unauthorized command attempt");
        return Err(CommandError::Unauthorized {
            caller: caller.to_string(),
            command: command.name().to_string(),
        });
    }
    Ok(())
}

/// Reply to `what_is_tracked`
pub fn what_is_tracked(links: &[String]) -> String {
    let mut text = String::from(
        "every minute >\n    • general logs (alert, error keywords)\n\
         every hour >\n    • system health, including hard disk\n\
         every day at 01:00 UTC >\n    • daily checks\n",
    );
    if !links.is_empty() {
        text.push_str("every 5 minutes >\n    • server up status for");
        for link in links {
            text.push_str("\n        ‣ ");
            text.push_str(link);
        }
        text.push('\n');
    }
    text
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("{caller} is not allowed to run {command}")]
    Unauthorized { caller: String, command: String },

    #[error("Agent is not running")]
    AgentUnavailable,
}
