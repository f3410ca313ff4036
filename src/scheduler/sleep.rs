//! Sleep duration parsing
//!
//! Operators pause jobs with `unit=count` tokens, e.g. `d=1 h=2 m=30`.

pub const DEFAULT_SLEEP_SECS: u64 = 86_400;

/// Longest accepted sleep; larger totals are cut down to this
pub const MAX_SLEEP_SECS: u64 = 365 * 86_400;

/// Seconds per unit; unknown units count for nothing
pub fn unit_seconds(unit: &str) -> u64 {
    match unit {
        "s" | "seconds" => 1,
        "m" | "minutes" => 60,
        "h" | "hours" => 3_600,
        "d" | "days" => 86_400,
        _ => 0,
    }
}

fn token_seconds(token: &str) -> Option<u64> {
    let (unit, count) = token.trim().split_once('=')?;
    if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Overlong digit strings saturate rather than drop out
    let count = count.parse::<u64>().unwrap_or(u64::MAX);
    Some(unit_seconds(unit).saturating_mul(count))
}

/// Total sleep in seconds
///
/// One day when nothing usable was given, never more than [`MAX_SLEEP_SECS`].
pub fn parse_sleep_seconds<'a, I>(tokens: I) -> u64
where
    I: IntoIterator<Item = &'a str>,
{
    let total = tokens
        .into_iter()
        .filter_map(token_seconds)
        .fold(0u64, u64::saturating_add);

    if total == 0 {
        DEFAULT_SLEEP_SECS
    } else {
        total.min(MAX_SLEEP_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_and_hours() {
        assert_eq!(parse_sleep_seconds(["d=1", "h=2"]), 93_600);
    }

    #[test]
    fn test_long_unit_names() {
        assert_eq!(parse_sleep_seconds(["minutes=5", "seconds=30"]), 330);
    }

    #[test]
    fn test_malformed_tokens_contribute_nothing() {
        assert_eq!(
            parse_sleep_seconds(["h=1", "m5", "s=abc", "w=3", "h=1=2", "s=", "s=-4"]),
            3_600
        );
    }

    #[test]
    fn test_empty_defaults_to_one_day() {
        assert_eq!(parse_sleep_seconds(Vec::<&str>::new()), DEFAULT_SLEEP_SECS);
        assert_eq!(parse_sleep_seconds(["garbage"]), DEFAULT_SLEEP_SECS);
    }

    #[test]
    fn test_huge_sleeps_are_capped() {
        assert_eq!(parse_sleep_seconds(["d=100000000"]), MAX_SLEEP_SECS);
        assert_eq!(parse_sleep_seconds(["s=18446744073709551615"]), MAX_SLEEP_SECS);
        assert_eq!(
            parse_sleep_seconds(["s=999999999999999999999999", "h=1"]),
            MAX_SLEEP_SECS
        );
    }
}
