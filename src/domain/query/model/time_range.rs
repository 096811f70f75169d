use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Absolute time range of one panel query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn is_valid(&self) -> bool {
        self.from <= self.to
    }

    /// Length of the range; zero when the range is empty or inverted.
    pub fn duration(&self) -> Duration {
        (self.to - self.from).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn from_millis(&self) -> i64 {
        self.from.timestamp_millis()
    }

    pub fn to_millis(&self) -> i64 {
        self.to.timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn inverted_range_has_zero_duration() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let range = TimeRange::new(t0, t0 - chrono::Duration::minutes(5));
        assert!(!range.is_valid());
        assert_eq!(range.duration(), Duration::ZERO);
    }

    #[test]
    fn deserializes_rfc3339_bounds() {
        let range: TimeRange = serde_json::from_value(serde_json::json!({
            "from": "2024-05-01T12:00:00Z",
            "to": "2024-05-01T13:00:00Z"
        }))
        .unwrap();
        assert_eq!(range.duration(), Duration::from_secs(3600));
    }
}
