//! Time helpers shared by plugins, the scheduler, and the engine.

use chrono::{DateTime, TimeDelta, Utc};

/// Parse a standings time cell into seconds.
///
/// Accepts `H:MM`, `H:MM:SS`, and bare minute counts. A leading `+` or
/// surrounding whitespace is ignored.
pub fn parse_time_seconds(text: &str) -> Option<i64> {
    let text = text.trim().trim_start_matches('+').trim_matches('"');
    if text.is_empty() {
        return None;
    }
    let parts: Vec<&str> = text.split(':').collect();
    let nums: Option<Vec<i64>> = parts.iter().map(|p| p.trim().parse::<i64>().ok()).collect();
    let nums = nums?;
    match nums.as_slice() {
        [minutes] => Some(minutes * 60),
        [hours, minutes] => Some(hours * 3600 + minutes * 60),
        [hours, minutes, seconds] => Some(hours * 3600 + minutes * 60 + seconds),
        _ => None,
    }
}

/// Seconds to a `TimeDelta`, clamping negatives to zero.
pub fn secs(seconds: i64) -> TimeDelta {
    TimeDelta::seconds(seconds.max(0))
}

/// The later of two optional instants.
pub fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_seconds() {
        assert_eq!(parse_time_seconds("1:05"), Some(3900));
        assert_eq!(parse_time_seconds("0:01:30"), Some(90));
        assert_eq!(parse_time_seconds("17"), Some(1020));
        assert_eq!(parse_time_seconds("+2:00"), Some(7200));
        assert_eq!(parse_time_seconds("n/a"), None);
        assert_eq!(parse_time_seconds(""), None);
    }

    #[test]
    fn test_secs_clamps_negative() {
        assert_eq!(secs(-5), TimeDelta::zero());
        assert_eq!(secs(60), TimeDelta::minutes(1));
    }

    #[test]
    fn test_latest() {
        let a = Utc::now();
        let b = a + TimeDelta::hours(1);
        assert_eq!(latest(Some(a), Some(b)), Some(b));
        assert_eq!(latest(None, Some(a)), Some(a));
        assert_eq!(latest(None, None), None);
    }
}
