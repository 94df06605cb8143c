//! Duration-string parsing for mutes and reminders
//!
//! The accepted grammar is a single integer followed by one unit letter:
//! `30s`, `10m`, `2h`, `1d`. Compound strings like `1h30m` are rejected.

use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;

static DURATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)([smhd])$").unwrap());

/// Parse a duration string like `30m` or `1d`. Returns `None` if the string
/// does not match the grammar or the value overflows.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let normalized = s.trim().to_lowercase();
    let caps = DURATION_RE.captures(&normalized)?;
    let amount: i64 = caps[1].parse().ok()?;
    let per_unit = match &caps[2] {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => unreachable!(),
    };
    Some(Duration::seconds(amount.checked_mul(per_unit)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_durations() {
        assert_eq!(parse_duration("45s"), Some(Duration::seconds(45)));
        assert_eq!(parse_duration("10m"), Some(Duration::seconds(600)));
        assert_eq!(parse_duration("2h"), Some(Duration::seconds(7200)));
        assert_eq!(parse_duration("1d"), Some(Duration::seconds(86400)));
        // Case and surrounding whitespace are tolerated
        assert_eq!(parse_duration("5M"), Some(Duration::seconds(300)));
        assert_eq!(parse_duration(" 1h "), Some(Duration::seconds(3600)));
    }

    #[test]
    fn test_parse_invalid_durations() {
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("10x"), None);
        assert_eq!(parse_duration("m10"), None);
        assert_eq!(parse_duration("10"), None);
        // The grammar is anchored: compound strings are rejected
        assert_eq!(parse_duration("1h30m"), None);
        assert_eq!(parse_duration("10m extra"), None);
    }

    #[test]
    fn test_parse_overflow() {
        assert_eq!(parse_duration("99999999999999999999s"), None);
        assert_eq!(parse_duration("9223372036854775807d"), None);
    }
}
