//! Append one entry to the general log store, then prune it
//!
//! Usage: logwarden-log JSON_ARG
//!
//! JSON_ARG holding a JSON object is stored as-is; anything else is stored as
//! `{"general": JSON_ARG}`. Honors GENERAL_LOGFILE and LOG_LIFE.

use chrono::Utc;
use logwarden::config::LogFilesConfig;
use logwarden::storage::{record_from_text, LogStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logwarden=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let text = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if text.trim().is_empty() {
        eprintln!("Usage: logwarden-log JSON_ARG");
        std::process::exit(2);
    }

    let files = LogFilesConfig::from_env()?;
    let store = LogStore::new(&files.general_log);
    let now = Utc::now();

    let key = store.append(record_from_text(&text), now)?;
    let removed = store.prune(files.retention_days, now)?;
    tracing::info!(
        path = %store.path().display(),
        key = %key,
        removed,
        "Logged entry"
    );
    Ok(())
}
