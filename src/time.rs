//! Time units of the form `<unit> since <date>` and ISO-8601 parsing.

use crate::error::{PointFlatError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::fmt;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// A time unit such as `hours since 1970-01-01 00:00:00`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeUnit {
    text: String,
    seconds_per_unit: f64,
    origin: DateTime<Utc>,
}

impl TimeUnit {
    /// Parse a units string.
    pub fn parse(units: &str) -> Result<Self> {
        let units = units.trim();
        let lower = units.to_ascii_lowercase();
        let idx = lower
            .find(" since ")
            .ok_or_else(|| PointFlatError::Conversion(format!("Not a time unit: '{}'", units)))?;
        let unit = lower[..idx].trim();
        let origin_text = units[idx + " since ".len()..].trim();

        let seconds_per_unit = Self::unit_seconds(unit)
            .ok_or_else(|| PointFlatError::Conversion(format!("Unknown time unit '{}'", unit)))?;
        let origin = parse_iso(origin_text).ok_or_else(|| {
            PointFlatError::Conversion(format!("Cannot parse reference date '{}'", origin_text))
        })?;

        Ok(Self {
            text: units.to_string(),
            seconds_per_unit,
            origin,
        })
    }

    /// Milliseconds since the Unix epoch, for values that are already epoch millis.
    pub fn epoch_millis() -> Self {
        Self {
            text: "milliseconds since 1970-01-01T00:00:00Z".to_string(),
            seconds_per_unit: 1e-3,
            origin: DateTime::<Utc>::from(std::time::UNIX_EPOCH),
        }
    }

    fn unit_seconds(unit: &str) -> Option<f64> {
        let s = match unit {
            "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1e-3,
            "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
            "min" | "mins" | "minute" | "minutes" => 60.0,
            "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
            "d" | "day" | "days" => SECONDS_PER_DAY,
            "week" | "weeks" => 7.0 * SECONDS_PER_DAY,
            // udunits calendar-free month and year
            "month" | "months" => 30.436_875 * SECONDS_PER_DAY,
            "year" | "years" | "yr" => 365.242_198_781 * SECONDS_PER_DAY,
            _ => return None,
        };
        Some(s)
    }

    /// The units string as given.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Reference date.
    pub fn origin(&self) -> DateTime<Utc> {
        self.origin
    }

    /// Convert a value in this unit to milliseconds since the Unix epoch.
    pub fn to_millis(&self, value: f64) -> f64 {
        self.origin.timestamp_millis() as f64 + value * self.seconds_per_unit * 1000.0
    }

    /// Convert a value in this unit to a calendar date. NaN has no date.
    pub fn to_date(&self, value: f64) -> Option<DateTime<Utc>> {
        let millis = self.to_millis(value);
        if !millis.is_finite() {
            return None;
        }
        Utc.timestamp_millis_opt(millis.round() as i64).single()
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Parse an ISO-8601 date or date-time, assuming UTC when no offset is given.
pub fn parse_iso(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = text
        .trim_end_matches('Z')
        .trim_end_matches("UTC")
        .trim_end_matches("+00:00")
        .trim();
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

/// Milliseconds since the Unix epoch of an ISO-8601 string.
pub fn iso_to_millis(text: &str) -> Option<f64> {
    parse_iso(text).map(|dt| dt.timestamp_millis() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units() {
        let tu = TimeUnit::parse("hours since 1970-01-02 00:00:00").unwrap();
        assert_eq!(tu.to_millis(0.0), 86_400_000.0);
        assert_eq!(tu.to_millis(1.5), 86_400_000.0 + 5_400_000.0);
        assert_eq!(
            tu.to_date(24.0).unwrap().to_rfc3339(),
            "1970-01-03T00:00:00+00:00"
        );
    }

    #[test]
    fn rejects_non_time_units() {
        assert!(TimeUnit::parse("degrees_north").is_err());
        assert!(TimeUnit::parse("fortnights since 2000-01-01").is_err());
        assert!(TimeUnit::parse("days since yesterday").is_err());
    }

    #[test]
    fn iso_variants() {
        let expected = Some(946_684_800_000.0);
        assert_eq!(iso_to_millis("2000-01-01"), expected);
        assert_eq!(iso_to_millis("2000-01-01T00:00:00Z"), expected);
        assert_eq!(iso_to_millis("2000-01-01 00:00:00"), expected);
        assert_eq!(iso_to_millis("2000-01-01T00:00"), expected);
        assert_eq!(iso_to_millis("not a date"), None);
    }
}
