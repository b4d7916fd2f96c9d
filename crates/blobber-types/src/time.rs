use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Seconds since the Unix epoch.
///
/// Markers carry timestamps in this form and the allocation root binds the
/// decimal rendering of it, so the `Display` impl must stay a plain integer.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub const fn as_secs(&self) -> i64 {
        self.0
    }

    /// Shift forward (or backward, for negative values) by `secs`.
    pub fn add_secs(&self, secs: i64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.0, 0)
    }

    /// Parse an RFC 3339 date-time such as `2024-05-01T10:00:00Z`.
    pub fn parse_rfc3339(s: &str) -> Result<Self, TypeError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.timestamp()))
            .map_err(|e| TypeError::InvalidTimestamp(format!("{s}: {e}")))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_decimal_seconds() {
        assert_eq!(Timestamp::from_secs(1_700_000_000).to_string(), "1700000000");
    }

    #[test]
    fn parse_rfc3339() {
        let ts = Timestamp::parse_rfc3339("1970-01-01T00:01:40Z").unwrap();
        assert_eq!(ts.as_secs(), 100);
        assert!(Timestamp::parse_rfc3339("yesterday").is_err());
    }

    #[test]
    fn ordering_and_arithmetic() {
        let t = Timestamp::from_secs(10);
        assert!(t < t.add_secs(1));
        assert_eq!(t.add_secs(-10).as_secs(), 0);
        assert_eq!(t.to_datetime().unwrap().timestamp(), 10);
    }

    #[test]
    fn now_is_recent() {
        assert!(Timestamp::now().as_secs() > 1_600_000_000);
    }
}
