//! Threshold and keyword evaluation over log stores
//!
//! Two modes share the same source discovery and output shape:
//!
//! - **Keyword mode** scans every entry newer than a cursor and splits each
//!   record's fields into heartbeat fields and alarm fields.
//! - **Threshold mode** looks only at the newest record of each source and
//!   checks it against numeric ceilings, plus a staleness check on the file.
//!
//! Errors found while scanning (corrupt stores, bad keys) are written into the
//! alarm text and the scan carries on with the next record or source.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde_json::Value;

use super::config::{AlarmKeywords, ThresholdRule};
use crate::storage::timestamp::display_timestamp;
use crate::storage::{latest_entry, parse_timestamp, LogMap, LogStore};

/// Result of evaluating one category across all of its sources
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Informational text, subject to heartbeat throttling
    pub heartbeat: String,
    /// Alarm text, always delivered when non-empty
    pub alarm: String,
    /// Cursor after this evaluation (never below the input cursor)
    pub cursor: f64,
    /// Number of source files found
    pub sources: usize,
}

/// Output of a keyword scan over a single store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordScan {
    pub heartbeat: String,
    pub alarm: String,
    pub cursor: f64,
}

/// Evaluates log stores found in one directory
#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    directory: PathBuf,
    keywords: AlarmKeywords,
    rules: Vec<ThresholdRule>,
    staleness_window: Duration,
}

impl ThresholdEvaluator {
    pub fn new(
        directory: impl Into<PathBuf>,
        keywords: AlarmKeywords,
        rules: Vec<ThresholdRule>,
        staleness_window: Duration,
    ) -> Self {
        Self {
            directory: directory.into(),
            keywords,
            rules,
            staleness_window,
        }
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    pub fn keywords(&self) -> &AlarmKeywords {
        &self.keywords
    }

    /// Keyword mode over every `category` source newer than `cursor`
    pub fn evaluate_keywords(&self, category: &str, cursor: f64) -> Evaluation {
        let mut evaluation = Evaluation {
            cursor,
            ..Default::default()
        };

        let sources = match discover_sources(&self.directory, category) {
            Ok(sources) => sources,
            Err(e) => {
                evaluation.alarm = format!("Cannot list {}: {}\n", self.directory.display(), e);
                return evaluation;
            }
        };
        evaluation.sources = sources.len();

        for path in sources {
            let file_name = file_name_of(&path);
            let source = source_label(&file_name, category);
            tracing::debug!(file = %file_name, "Scanning log source");

            let entries = match LogStore::new(&path).load() {
                Ok(entries) => entries,
                Err(e) => {
                    let _ = writeln!(evaluation.alarm, "Error with {}: {}", file_name, e);
                    continue;
                }
            };

            let scan = scan_keywords(&entries, cursor, &self.keywords);
            if !scan.heartbeat.is_empty() {
                let _ = write!(evaluation.heartbeat, "{}:\n{}\n\n", source, scan.heartbeat);
            }
            if !scan.alarm.is_empty() {
                let _ = write!(evaluation.alarm, "{}:\n{}\n\n", source, scan.alarm);
            }
            evaluation.cursor = evaluation.cursor.max(scan.cursor);
        }

        evaluation
    }

    /// Threshold mode over the newest record of every `category` source
    ///
    /// The cursor is not used for selection and is returned unchanged.
    pub fn evaluate_thresholds(&self, category: &str, cursor: f64, now: SystemTime) -> Evaluation {
        let mut evaluation = Evaluation {
            cursor,
            ..Default::default()
        };

        let sources = match discover_sources(&self.directory, category) {
            Ok(sources) => sources,
            Err(e) => {
                evaluation.alarm = format!("Cannot list {}: {}\n", self.directory.display(), e);
                return evaluation;
            }
        };
        evaluation.sources = sources.len();

        for path in sources {
            let file_name = file_name_of(&path);
            let source = source_label(&file_name, category);
            let store = LogStore::new(&path);

            match store.modified() {
                Ok(modified) => {
                    if let Some(alert) =
                        staleness_alert(&file_name, modified, now, self.staleness_window)
                    {
                        evaluation.alarm.push_str(&alert);
                    }
                }
                Err(e) => {
                    let _ = writeln!(evaluation.alarm, "Error with {}: {}", file_name, e);
                }
            }

            let entries = match store.load() {
                Ok(entries) => entries,
                Err(e) => {
                    let _ = writeln!(evaluation.alarm, "Error with {}: {}", file_name, e);
                    continue;
                }
            };

            let check = check_thresholds(&source, &file_name, &entries, &self.rules);
            evaluation.heartbeat.push_str(&check.heartbeat);
            evaluation.alarm.push_str(&check.alarm);
        }

        evaluation
    }
}

/// Split every entry newer than `cursor` into heartbeat and alarm blocks
pub fn scan_keywords(entries: &LogMap, cursor: f64, keywords: &AlarmKeywords) -> KeywordScan {
    let mut scan = KeywordScan {
        cursor,
        ..Default::default()
    };

    for (key, data) in entries {
        let ts = match parse_timestamp(key) {
            Ok(ts) => ts,
            Err(e) => {
                let _ = writeln!(scan.alarm, "  {}", e);
                continue;
            }
        };

        if ts <= cursor {
            continue;
        }
        scan.cursor = scan.cursor.max(ts);

        let Value::Object(record) = data else {
            let _ = writeln!(scan.alarm, "  {}:\n    record is not an object: {}", key, data);
            continue;
        };

        let label = display_timestamp(ts);
        let (alarm_fields, heartbeat_fields): (Vec<_>, Vec<_>) = record
            .iter()
            .partition(|(field, _)| keywords.contains(field));

        if !heartbeat_fields.is_empty() {
            let _ = writeln!(scan.heartbeat, "  {}:\n{}", label, render_fields(&heartbeat_fields));
        }
        if !alarm_fields.is_empty() {
            let _ = writeln!(scan.alarm, "  {}:\n{}", label, render_fields(&alarm_fields));
        }
    }

    scan
}

/// Heartbeat and alarm text for one health source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdCheck {
    pub heartbeat: String,
    pub alarm: String,
}

/// Compare the newest record of a source against `rules`
pub fn check_thresholds(
    source: &str,
    file_name: &str,
    entries: &LogMap,
    rules: &[ThresholdRule],
) -> ThresholdCheck {
    let mut check = ThresholdCheck::default();
    let latest = match latest_entry(entries) {
        Some((_, Value::Object(record))) => Some(record),
        _ => None,
    };

    let mut lines = Vec::with_capacity(rules.len());
    for rule in rules {
        match latest.and_then(|record| record.get(&rule.field)) {
            Some(value) => {
                lines.push(format!("{}: {}", rule.field, render_value(value)));
                match value.as_f64() {
                    Some(number) if rule.is_exceeded_by(number) => {
                        let _ = writeln!(
                            check.alarm,
                            "{} ==>  {} ({}) exceeds threshold ({})",
                            source,
                            rule.field,
                            render_value(value),
                            rule.ceiling
                        );
                    }
                    Some(_) => {}
                    None => {
                        let _ = writeln!(
                            check.alarm,
                            "{} ==>  {} ({}) is not numeric",
                            source,
                            rule.field,
                            render_value(value)
                        );
                    }
                }
            }
            None => {
                lines.push(format!("{}: not found", rule.field));
                let _ = writeln!(check.alarm, "{}: {} not found.", file_name, rule.field);
            }
        }
    }

    check.heartbeat = format!("{} ==>\n    {}\n", source, lines.join("\n    "));
    check
}

/// Alarm line when `modified` is more than `window` behind `now`
pub fn staleness_alert(
    file_name: &str,
    modified: SystemTime,
    now: SystemTime,
    window: Duration,
) -> Option<String> {
    let age = now.duration_since(modified).ok()?;
    if age <= window {
        return None;
    }
    Some(format!(
        "{} has not been updated in {} hours.\n",
        file_name,
        age.as_secs() / 3600
    ))
}

/// Files in `directory` whose name contains `category`, sorted by name
pub fn discover_sources(directory: &Path, category: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = file_name_of(&path);
        if name.contains(category) && !is_store_artifact(&name) {
            sources.push(path);
        }
    }
    sources.sort();
    Ok(sources)
}

/// Display label for a source file: `health_logs.web-1.json` → `web-1`
pub fn source_label(file_name: &str, category: &str) -> String {
    let stem = file_name
        .find(".json")
        .map(|idx| &file_name[..idx])
        .unwrap_or(file_name);

    match stem.split_once('.') {
        Some((_, rest)) => rest.to_string(),
        None if stem == category => String::new(),
        None => stem.to_string(),
    }
}

/// Lock and temp files written next to stores
fn is_store_artifact(name: &str) -> bool {
    name.ends_with(".lock") || name.ends_with(".tmp")
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn render_fields(fields: &[(&String, &Value)]) -> String {
    fields
        .iter()
        .map(|(field, value)| format!("    {}: {}", field, render_value(value)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strings are shown bare, everything else as compact JSON
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
