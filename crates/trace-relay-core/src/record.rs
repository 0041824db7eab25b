//! Typed trace records decoded from the realtime feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ticks (100 ns) between 1601-01-01 and the Unix epoch.
const FILETIME_UNIX_OFFSET: i64 = 116_444_736_000_000_000;

/// Ticks per second.
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ordinal severity of a trace event. Lower value means higher severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceLevel {
    Always = 0,
    Critical = 1,
    Error = 2,
    Warning = 3,
    Info = 4,
    Verbose = 5,
}

/// Display class derived from a [`TraceLevel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl TraceLevel {
    /// Map a raw level number from the feed.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match raw {
            0 => Some(Self::Always),
            1 => Some(Self::Critical),
            2 => Some(Self::Error),
            3 => Some(Self::Warning),
            4 => Some(Self::Info),
            5 => Some(Self::Verbose),
            _ => None,
        }
    }

    /// Severity class used for display (icons, colors).
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::Always | Self::Critical | Self::Error => Severity::Error,
            Self::Warning => Severity::Warning,
            Self::Info | Self::Verbose => Severity::Info,
        }
    }
}

impl std::fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Always => "always",
            Self::Critical => "critical",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Verbose => "verbose",
        };
        f.write_str(name)
    }
}

/// One decoded log-category event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub timestamp: DateTime<Utc>,
    pub level: TraceLevel,
    pub message: String,
}

impl TraceRecord {
    /// Create a record, stripping one layer of surrounding quotes from `message`.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, level: TraceLevel, message: &str) -> Self {
        Self {
            timestamp,
            level,
            message: strip_quotes(message).to_string(),
        }
    }

    /// Universal sortable rendering, e.g. `2024-03-01 12:30:00Z`.
    #[must_use]
    pub fn display_timestamp(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%SZ").to_string()
    }

    /// Rough size in bytes, used to bound feed history.
    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.message.len()
    }
}

/// Convert platform epoch ticks (100 ns since 1601-01-01 UTC) to a timestamp.
///
/// Returns `None` when the value is outside chrono's representable range.
#[must_use]
pub fn from_filetime(ticks: i64) -> Option<DateTime<Utc>> {
    let since_unix = ticks.checked_sub(FILETIME_UNIX_OFFSET)?;
    let secs = since_unix.div_euclid(TICKS_PER_SECOND);
    let nanos = u32::try_from(since_unix.rem_euclid(TICKS_PER_SECOND) * 100).ok()?;
    DateTime::from_timestamp(secs, nanos)
}

/// Inverse of [`from_filetime`].
#[must_use]
pub fn to_filetime(timestamp: DateTime<Utc>) -> i64 {
    let secs = timestamp.timestamp();
    let sub = i64::from(timestamp.timestamp_subsec_nanos()) / 100;
    secs * TICKS_PER_SECOND + sub + FILETIME_UNIX_OFFSET
}

fn strip_quotes(message: &str) -> &str {
    let message = message.strip_prefix('"').unwrap_or(message);
    message.strip_suffix('"').unwrap_or(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filetime_unix_epoch() {
        let ts = from_filetime(FILETIME_UNIX_OFFSET).unwrap();
        assert_eq!(ts.timestamp(), 0);
        assert_eq!(ts.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_filetime_known_value() {
        // 2021-01-01 00:00:00 UTC
        let ts = from_filetime(132_539_328_000_000_000).unwrap();
        assert_eq!(ts.to_rfc3339(), "2021-01-01T00:00:00+00:00");
        assert_eq!(to_filetime(ts), 132_539_328_000_000_000);
    }

    #[test]
    fn test_filetime_sub_second_ticks() {
        let ts = from_filetime(FILETIME_UNIX_OFFSET + 15).unwrap();
        assert_eq!(ts.timestamp_subsec_nanos(), 1_500);
    }

    #[test]
    fn test_filetime_before_unix_epoch() {
        let ts = from_filetime(0).unwrap();
        assert_eq!(ts.to_rfc3339(), "1601-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_level_from_raw() {
        assert_eq!(TraceLevel::from_raw(0), Some(TraceLevel::Always));
        assert_eq!(TraceLevel::from_raw(5), Some(TraceLevel::Verbose));
        assert_eq!(TraceLevel::from_raw(6), None);
    }

    #[test]
    fn test_severity_classes() {
        assert_eq!(TraceLevel::Always.severity(), Severity::Error);
        assert_eq!(TraceLevel::Critical.severity(), Severity::Error);
        assert_eq!(TraceLevel::Error.severity(), Severity::Error);
        assert_eq!(TraceLevel::Warning.severity(), Severity::Warning);
        assert_eq!(TraceLevel::Info.severity(), Severity::Info);
        assert_eq!(TraceLevel::Verbose.severity(), Severity::Info);
    }

    #[test]
    fn test_level_ordering() {
        assert!(TraceLevel::Critical < TraceLevel::Warning);
        assert!(TraceLevel::Verbose > TraceLevel::Info);
    }

    #[test]
    fn test_quote_stripping() {
        let ts = from_filetime(FILETIME_UNIX_OFFSET).unwrap();
        assert_eq!(TraceRecord::new(ts, TraceLevel::Info, "\"hello\"").message, "hello");
        assert_eq!(TraceRecord::new(ts, TraceLevel::Info, "hello").message, "hello");
        assert_eq!(TraceRecord::new(ts, TraceLevel::Info, "\"\"x\"\"").message, "\"x\"");
        assert_eq!(TraceRecord::new(ts, TraceLevel::Info, "\"").message, "");
    }

    #[test]
    fn test_display_timestamp() {
        let record = TraceRecord::new(
            from_filetime(132_539_328_000_000_000).unwrap(),
            TraceLevel::Info,
            "x",
        );
        assert_eq!(record.display_timestamp(), "2021-01-01 00:00:00Z");
    }
}
