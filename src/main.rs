//! Logwarden monitoring agent
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - BOT_TOKEN, CHAT_ID, HEARTBEAT_CHAT_ID, BOT_DIRECTORY: required
//! - HEARTBEAT_WAIT_PERIOD_FILE, LINKS_FILE_PATH, THRESHOLDS_FILE: optional JSON files
//! - ALARM_KEYWORDS, ADMIN_IDS: comma-separated lists
//! - GENERAL_LOGFILE, HEALTH_LOGFILE: local stores accepting ingestion over HTTP
//! - LOGWARDEN_HOST / LOGWARDEN_PORT: control API bind (default 127.0.0.1:8090)
//! - RUST_LOG: Log level (default: info)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use logwarden::alerts::{
    HeartbeatThrottle, TelegramNotifier, ThresholdEvaluator, HEALTH_STALENESS_WINDOW,
};
use logwarden::api::{run_server, AppState, ServerConfig};
use logwarden::config::{AgentConfig, LogFilesConfig, GENERAL_LOGS, HEALTH_LOGS};
use logwarden::monitor::uptime::uptime_client;
use logwarden::monitor::{Agent, Cursors, Destinations, MonitorContext, NoDailyChecks, StaticAdmins};
use logwarden::storage::{to_epoch, LogStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logwarden=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Cannot start without configuration");
            return Err(e.into());
        }
    };
    let files = LogFilesConfig::from_env()?;

    tracing::info!("Logwarden configuration:");
    tracing::info!("  Bot directory: {}", config.bot_directory.display());
    tracing::info!("  Uptime links: {}", config.links.len());
    tracing::info!(
        "  Thresholds: {}",
        config
            .health_rules
            .iter()
            .map(|r| format!("{}>{}", r.field, r.ceiling))
            .collect::<Vec<_>>()
            .join(", ")
    );
    tracing::info!("  Admins: {}", config.admin_ids.len());

    let now = Utc::now();
    let notifier = Arc::new(TelegramNotifier::new(config.bot_token.clone())?);
    let context = MonitorContext::new(
        &config.bot_directory,
        Cursors::new([GENERAL_LOGS, HEALTH_LOGS]),
        HeartbeatThrottle::new(config.wait_periods.clone(), to_epoch(now)),
        ThresholdEvaluator::new(
            &config.bot_directory,
            config.alarm_keywords.clone(),
            config.health_rules.clone(),
            HEALTH_STALENESS_WINDOW,
        ),
        config.links.clone(),
        Destinations {
            alarm: config.alarm_chat_id.clone(),
            heartbeat: config.heartbeat_chat_id.clone(),
        },
        notifier,
        Arc::new(NoDailyChecks),
        uptime_client()?,
    );

    let admins = Arc::new(StaticAdmins::new(config.admin_ids.clone()));
    let running = Agent::new(context, admins, now).start(Duration::from_secs(1));

    let mut stores = HashMap::new();
    stores.insert(GENERAL_LOGS.to_string(), LogStore::new(&files.general_log));
    stores.insert(HEALTH_LOGS.to_string(), LogStore::new(&files.health_log));
    let state = Arc::new(AppState {
        agent: running.handle.clone(),
        stores,
    });

    let server_config = ServerConfig {
        host: config.host.clone(),
        port: config.port,
    };
    let served = run_server(server_config, state, shutdown_signal()).await;

    running.stop().await;
    tracing::info!("Logwarden stopped");
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping agent...");
}
