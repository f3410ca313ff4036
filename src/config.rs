//! Environment and file based configuration
//!
//! Agent (`logwarden`):
//! - BOT_TOKEN, CHAT_ID, HEARTBEAT_CHAT_ID, BOT_DIRECTORY: required
//! - HEARTBEAT_WAIT_PERIOD_FILE: JSON `{category: seconds}`
//! - LINKS_FILE_PATH: JSON array of URLs for uptime checks
//! - THRESHOLDS_FILE: JSON `{field: ceiling}` for health logs
//! - ALARM_KEYWORDS: comma-separated (default: alert,error)
//! - ADMIN_IDS: comma-separated caller ids allowed to run privileged commands
//! - LOGWARDEN_HOST / LOGWARDEN_PORT: control API bind (default 127.0.0.1:8090)
//!
//! Local log tools (`logwarden-log`, `logwarden-probe`, `logwarden-push`):
//! - GENERAL_LOGFILE, HEALTH_LOGFILE: store paths
//! - LOG_LIFE: retention in days (default 3)
//! - RSA_ID_PATH, REMOTE_PATH: replication identity and `user@host:dir`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::alerts::config::{default_health_rules, rules_from_table, DEFAULT_ALARM_KEYWORDS};
use crate::alerts::{AlarmKeywords, ThresholdRule};
use crate::storage::DEFAULT_RETENTION_DAYS;

pub const GENERAL_LOGS: &str = "general_logs";
pub const HEALTH_LOGS: &str = "health_logs";

const REQUIRED_AGENT_VARS: &[&str] = &["BOT_TOKEN", "CHAT_ID", "HEARTBEAT_CHAT_ID", "BOT_DIRECTORY"];

/// Monitoring agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub bot_token: String,
    /// Destination for alarms and command replies
    pub alarm_chat_id: String,
    /// Destination for throttled heartbeats
    pub heartbeat_chat_id: String,
    /// Directory holding `<category>.<source>.json` stores
    pub bot_directory: PathBuf,
    pub wait_periods: HashMap<String, u64>,
    pub links: Vec<String>,
    pub health_rules: Vec<ThresholdRule>,
    pub alarm_keywords: AlarmKeywords,
    pub admin_ids: Vec<String>,
    pub host: String,
    pub port: u16,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source; referenced files are read here, once
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<String> = REQUIRED_AGENT_VARS
            .iter()
            .filter(|key| get(key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingVars(missing));
        }

        let wait_periods = match get("HEARTBEAT_WAIT_PERIOD_FILE") {
            Some(path) => load_json_file::<HashMap<String, u64>>(Path::new(&path))?,
            None => HashMap::new(),
        };
        let links = match get("LINKS_FILE_PATH") {
            Some(path) => load_json_file::<Vec<String>>(Path::new(&path))?,
            None => Vec::new(),
        };
        let health_rules = match get("THRESHOLDS_FILE") {
            Some(path) => rules_from_table(load_json_file::<HashMap<String, f64>>(Path::new(&path))?),
            None => default_health_rules(),
        };
        let alarm_keywords = match get("ALARM_KEYWORDS") {
            Some(list) => AlarmKeywords::new(split_list(&list)),
            None => AlarmKeywords::new(DEFAULT_ALARM_KEYWORDS.iter().copied()),
        };
        let port = match get("LOGWARDEN_PORT") {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("LOGWARDEN_PORT={} is not a port", port)))?,
            None => 8090,
        };

        Ok(Self {
            bot_token: get("BOT_TOKEN").unwrap_or_default(),
            alarm_chat_id: get("CHAT_ID").unwrap_or_default(),
            heartbeat_chat_id: get("HEARTBEAT_CHAT_ID").unwrap_or_default(),
            bot_directory: PathBuf::from(get("BOT_DIRECTORY").unwrap_or_default()),
            wait_periods,
            links,
            health_rules,
            alarm_keywords,
            admin_ids: get("ADMIN_IDS").map(|l| split_list(&l)).unwrap_or_default(),
            host: get("LOGWARDEN_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
        })
    }
}

/// Paths and retention used by the local log tools
#[derive(Debug, Clone)]
pub struct LogFilesConfig {
    pub general_log: PathBuf,
    pub health_log: PathBuf,
    pub retention_days: u32,
    pub rsa_id_path: Option<PathBuf>,
    pub remote_path: Option<String>,
}

impl LogFilesConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let retention_days = match get("LOG_LIFE") {
            Some(days) => days
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("LOG_LIFE={} is not a number of days", days)))?,
            None => DEFAULT_RETENTION_DAYS,
        };

        Ok(Self {
            general_log: PathBuf::from(
                get("GENERAL_LOGFILE").unwrap_or_else(|| format!("{}.json", GENERAL_LOGS)),
            ),
            health_log: PathBuf::from(
                get("HEALTH_LOGFILE").unwrap_or_else(|| format!("{}.json", HEALTH_LOGS)),
            ),
            retention_days,
            rsa_id_path: get("RSA_ID_PATH").map(PathBuf::from),
            remote_path: get("REMOTE_PATH"),
        })
    }
}

/// Read and parse a JSON configuration file
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variables: {}", .0.join(", "))]
    MissingVars(Vec<String>),

    #[error("Cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, String)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, String)> {
        vec![
            ("BOT_TOKEN", "token".to_string()),
            ("CHAT_ID", "-100".to_string()),
            ("HEARTBEAT_CHAT_ID", "-200".to_string()),
            ("BOT_DIRECTORY", "/var/lib/logwarden".to_string()),
        ]
    }

    #[test]
    fn test_missing_required_vars_are_listed() {
        let err = AgentConfig::from_lookup(lookup(&[("BOT_TOKEN", "t".to_string())])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing environment variables: CHAT_ID, HEARTBEAT_CHAT_ID, BOT_DIRECTORY"
        );
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::from_lookup(lookup(&required())).unwrap();

        assert_eq!(config.alarm_chat_id, "-100");
        assert!(config.wait_periods.is_empty());
        assert!(config.links.is_empty());
        assert_eq!(config.health_rules, default_health_rules());
        assert!(config.alarm_keywords.contains("error"));
        assert_eq!(config.port, 8090);
    }

    #[test]
    fn test_files_are_loaded() {
        let dir = TempDir::new().unwrap();
        let waits = dir.path().join("waits.json");
        let links = dir.path().join("links.json");
        let thresholds = dir.path().join("thresholds.json");
        std::fs::write(&waits, r#"{"general_logs": 3600, "up_checks": 600}"#).unwrap();
        std::fs::write(&links, r#"["https://example.com/health"]"#).unwrap();
        std::fs::write(&thresholds, r#"{"disk_usage": 90, "memory": 80.5}"#).unwrap();

        let mut vars = required();
        vars.push(("HEARTBEAT_WAIT_PERIOD_FILE", waits.display().to_string()));
        vars.push(("LINKS_FILE_PATH", links.display().to_string()));
        vars.push(("THRESHOLDS_FILE", thresholds.display().to_string()));
        vars.push(("ALARM_KEYWORDS", "fatal, error".to_string()));
        vars.push(("ADMIN_IDS", "42,77".to_string()));

        let config = AgentConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.wait_periods["up_checks"], 600);
        assert_eq!(config.links, vec!["https://example.com/health"]);
        assert_eq!(config.health_rules.len(), 2);
        assert_eq!(config.health_rules[1], ThresholdRule::new("memory", 80.5));
        assert!(config.alarm_keywords.contains("fatal"));
        assert!(!config.alarm_keywords.contains("alert"));
        assert_eq!(config.admin_ids, vec!["42", "77"]);
    }

    #[test]
    fn test_unreadable_wait_period_file_is_an_error() {
        let mut vars = required();
        vars.push(("HEARTBEAT_WAIT_PERIOD_FILE", "/nonexistent/waits.json".to_string()));
        assert!(matches!(
            AgentConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_log_files_defaults() {
        let config = LogFilesConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.general_log, PathBuf::from("general_logs.json"));
        assert_eq!(config.retention_days, 3);
        assert!(config.remote_path.is_none());

        let config = LogFilesConfig::from_lookup(|key| match key {
            "LOG_LIFE" => Some("7".to_string()),
            "REMOTE_PATH" => Some("me@collector:/srv/logs".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.remote_path.as_deref(), Some("me@collector:/srv/logs"));
    }
}
