//! Timestamp keys used by log stores
//!
//! Keys are either bare epoch seconds (`"1700000000.25"`) or naive ISO-8601
//! datetimes with microsecond precision (`"2024-05-01T12:30:00.123456"`).
//! Epoch parsing is always attempted first, so a key that could be read both
//! ways is read as epoch seconds.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use super::StoreError;

/// Format used when stamping new entries
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Accepted ISO form when reading keys (fraction optional)
const ISO_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Parse a store key into epoch seconds
pub fn parse_timestamp(key: &str) -> Result<f64, StoreError> {
    let trimmed = key.trim();

    if let Ok(secs) = trimmed.parse::<f64>() {
        if secs.is_finite() {
            return Ok(secs);
        }
    }

    NaiveDateTime::parse_from_str(trimmed, ISO_PARSE_FORMAT)
        .map(|naive| {
            let utc = Utc.from_utc_datetime(&naive);
            utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_micros()) / 1_000_000.0
        })
        .map_err(|_| StoreError::TimestampFormat(key.to_string()))
}

/// Parse a store key into a UTC datetime
pub fn parse_datetime(key: &str) -> Result<DateTime<Utc>, StoreError> {
    let secs = parse_timestamp(key)?;
    epoch_to_datetime(secs).ok_or_else(|| StoreError::TimestampFormat(key.to_string()))
}

/// Render a key for new entries
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format(ISO_FORMAT).to_string()
}

/// Human-readable form used in heartbeat and alarm text
///
/// Whole seconds print without a fraction.
pub fn display_timestamp(secs: f64) -> String {
    match epoch_to_datetime(secs) {
        Some(dt) if dt.timestamp_subsec_micros() == 0 => {
            dt.format("%Y-%m-%d %H:%M:%S").to_string()
        }
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        None => format!("{}", secs),
    }
}

/// Convert a datetime into fractional epoch seconds
pub fn to_epoch(dt: DateTime<Utc>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_micros()) / 1_000_000.0
}

pub fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    let whole = secs.floor();
    let micros = ((secs - whole) * 1_000_000.0).round() as u32;
    Utc.timestamp_opt(whole as i64, micros.min(999_999) * 1_000).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_epoch_seconds() {
        assert_eq!(parse_timestamp("1700000000").unwrap(), 1_700_000_000.0);
        assert_eq!(parse_timestamp("1700000000.5").unwrap(), 1_700_000_000.5);
    }

    #[test]
    fn test_parse_iso_microseconds() {
        let secs = parse_timestamp("2024-01-02T03:04:05.250000").unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap().timestamp() as f64 + 0.25;
        assert!((secs - expected).abs() < 1e-6);
    }

    #[test]
    fn test_parse_iso_without_fraction() {
        let secs = parse_timestamp("2024-01-02T03:04:05").unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap().timestamp() as f64;
        assert_eq!(secs, expected);
    }

    #[test]
    fn test_rejects_other_formats() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(StoreError::TimestampFormat(_))
        ));
        assert!(parse_timestamp("2024/01/02 03:04:05").is_err());
        assert!(parse_timestamp("NaN").is_err());
    }

    #[test]
    fn test_display_drops_zero_fraction() {
        let whole = to_epoch(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        assert_eq!(display_timestamp(whole), "2024-06-01 12:00:00");
        assert_eq!(display_timestamp(whole + 0.25), "2024-06-01 12:00:00.250000");
    }

    #[test]
    fn test_format_round_trips_through_parse() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
            + chrono::Duration::microseconds(123_456);
        let key = format_timestamp(now);
        assert_eq!(key, "2024-06-01T12:00:00.123456");
        assert!((parse_timestamp(&key).unwrap() - to_epoch(now)).abs() < 1e-6);
    }
}
