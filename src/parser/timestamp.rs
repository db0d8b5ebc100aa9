//! Timestamp recognition shared by the parsers.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Formats tried, in order, when no explicit format is configured.
const ZONED_FORMATS: &[&str] = &[
    "%d/%b/%Y:%H:%M:%S %z", // nginx $time_local
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f %Z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%y%m%d %H:%M:%S", // mysql 5.6 slow log
];

/// How naive (zone-less) timestamps are interpreted: in `zone` when set,
/// else in the host's zone with `localtime`, else as UTC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeContext {
    pub localtime: bool,
    pub zone: Option<Tz>,
}

impl TimeContext {
    pub fn new(localtime: bool) -> Self {
        Self {
            localtime,
            zone: None,
        }
    }

    pub fn with_zone(mut self, zone: Option<Tz>) -> Self {
        self.zone = zone;
        self
    }

    fn from_naive(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        if let Some(zone) = self.zone {
            zone.from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
        } else if self.localtime {
            Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
        } else {
            Some(Utc.from_utc_datetime(&naive))
        }
    }

    /// Parse `raw` with an explicit strftime `format` if given, otherwise by
    /// trying RFC 3339, a set of common log formats and epoch seconds.
    pub fn parse(&self, raw: &str, format: Option<&str>) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Some(format) = format {
            if let Ok(dt) = DateTime::parse_from_str(raw, format) {
                return Some(dt.with_timezone(&Utc));
            }
            return NaiveDateTime::parse_from_str(raw, format)
                .ok()
                .and_then(|naive| self.from_naive(naive));
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        for format in ZONED_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(raw, format) {
                return Some(dt.with_timezone(&Utc));
            }
        }
        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return self.from_naive(naive);
            }
        }
        parse_epoch(raw)
    }
}

/// Seconds (optionally fractional) since the unix epoch.
pub fn parse_epoch(raw: &str) -> Option<DateTime<Utc>> {
    let secs: f64 = raw.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
    DateTime::from_timestamp(whole, nanos.min(999_999_999))
}
