//! Symbolic chart ranges.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How far back a chart reaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Hour,
    Day,
    Week,
    /// 30 days
    Month,
    /// 365 days
    Year,
    /// Everything since the Unix epoch
    #[default]
    All,
}

impl TimeRange {
    /// Parse a range token; unknown tokens mean [`TimeRange::All`].
    pub fn parse(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "hour" => TimeRange::Hour,
            "day" => TimeRange::Day,
            "week" => TimeRange::Week,
            "month" => TimeRange::Month,
            "year" => TimeRange::Year,
            _ => TimeRange::All,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::Hour => "hour",
            TimeRange::Day => "day",
            TimeRange::Week => "week",
            TimeRange::Month => "month",
            TimeRange::Year => "year",
            TimeRange::All => "all",
        }
    }

    /// Length of the range, `None` for [`TimeRange::All`].
    pub fn duration(self) -> Option<Duration> {
        match self {
            TimeRange::Hour => Some(Duration::hours(1)),
            TimeRange::Day => Some(Duration::hours(24)),
            TimeRange::Week => Some(Duration::days(7)),
            TimeRange::Month => Some(Duration::days(30)),
            TimeRange::Year => Some(Duration::days(365)),
            TimeRange::All => None,
        }
    }

    /// First instant covered when the range ends at `now`.
    pub fn start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.duration() {
            Some(duration) => now - duration,
            None => DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Chart title for this range.
    pub fn title(self) -> String {
        match self {
            TimeRange::All => "Temperature all time".to_string(),
            range => format!("Temperature last {}", range.as_str()),
        }
    }
}

impl From<&str> for TimeRange {
    fn from(token: &str) -> Self {
        TimeRange::parse(token)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_known_and_unknown() {
        assert_eq!(TimeRange::parse("hour"), TimeRange::Hour);
        assert_eq!(TimeRange::parse("Week"), TimeRange::Week);
        assert_eq!(TimeRange::parse("year"), TimeRange::Year);
        assert_eq!(TimeRange::parse("fortnight"), TimeRange::All);
        assert_eq!(TimeRange::parse(""), TimeRange::All);
    }

    #[test]
    fn test_start() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(
            TimeRange::Day.start(now),
            Utc.with_ymd_and_hms(2024, 3, 30, 12, 0, 0).unwrap()
        );
        assert_eq!(
            TimeRange::Month.start(now),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(TimeRange::All.start(now).timestamp(), 0);
    }

    #[test]
    fn test_title() {
        assert_eq!(TimeRange::Hour.title(), "Temperature last hour");
        assert_eq!(TimeRange::All.title(), "Temperature all time");
        assert_eq!(TimeRange::Month.to_string(), "month");
    }
}
