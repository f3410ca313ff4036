//! Alarm rule types

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Field names that route a general-log field to the alarm channel
pub const DEFAULT_ALARM_KEYWORDS: &[&str] = &["alert", "error"];

/// How far behind a health source may fall before it is reported
pub const HEALTH_STALENESS_WINDOW: Duration = Duration::from_secs(3600);

/// Numeric ceiling for one field of the newest health record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub field: String,
    pub ceiling: f64,
}

impl ThresholdRule {
    pub fn new(field: impl Into<String>, ceiling: f64) -> Self {
        Self {
            field: field.into(),
            ceiling,
        }
    }

    /// Whether `value` breaches this rule
    pub fn is_exceeded_by(&self, value: f64) -> bool {
        value > self.ceiling
    }
}

/// Rules applied to health logs when no thresholds file is configured
pub fn default_health_rules() -> Vec<ThresholdRule> {
    vec![ThresholdRule::new("disk_usage", 95.0)]
}

/// Build rules from a `field -> ceiling` table, ordered by field name
pub fn rules_from_table(table: HashMap<String, f64>) -> Vec<ThresholdRule> {
    let mut rules: Vec<ThresholdRule> = table
        .into_iter()
        .map(|(field, ceiling)| ThresholdRule { field, ceiling })
        .collect();
    rules.sort_by(|a, b| a.field.cmp(&b.field));
    rules
}

/// Set of alarm keywords
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmKeywords(BTreeSet<String>);

impl AlarmKeywords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(words.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for AlarmKeywords {
    fn default() -> Self {
        Self::new(DEFAULT_ALARM_KEYWORDS.iter().copied())
    }
}
