//! Normalising ingested log entries into records

use serde_json::Value;

use super::{Record, StoreError};

/// Field used when a plain string is logged
pub const GENERAL_FIELD: &str = "general";

/// Turn an ingestion payload into a record
///
/// Objects are used as-is. Strings holding a JSON object are parsed; any
/// other string is wrapped as `{"general": <string>}`. Every other payload is
/// rejected before anything is written.
pub fn into_record(input: Value) -> Result<Record, StoreError> {
    match input {
        Value::Object(map) => Ok(map),
        Value::String(text) => Ok(record_from_text(&text)),
        other => Err(StoreError::InvalidInput(format!(
            "log entries must be an object or a string, got {}",
            other
        ))),
    }
}

/// Parse a raw text argument (CLI or HTTP body) into a record
pub fn record_from_text(text: &str) -> Record {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut record = Record::new();
            record.insert(GENERAL_FIELD.to_string(), Value::String(text.to_string()));
            record
        }
    }
}
