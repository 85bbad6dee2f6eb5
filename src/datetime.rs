//! Date/time utilities for quotastore.

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Format used for modification times in listings (`dd.MM.yyyy HH:mm:ss`).
pub const LISTING_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Parse a timezone name, e.g. "Europe/Belgrade" or "UTC".
pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.parse().ok()
}

/// Convert a filesystem timestamp to UTC.
pub fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// Format a DateTime<Utc> in the given timezone.
///
/// # Arguments
///
/// * `dt` - DateTime in UTC
/// * `tz` - Target timezone
/// * `format` - Output format string (e.g., "%Y/%m/%d %H:%M")
pub fn format_utc_datetime(dt: &DateTime<Utc>, tz: &Tz, format: &str) -> String {
    dt.with_timezone(tz).format(format).to_string()
}

/// Format a modification time the way listings show it.
pub fn format_listing_time(dt: &DateTime<Utc>, tz: &Tz) -> String {
    format_utc_datetime(dt, tz, LISTING_FORMAT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("UTC"), Some(Tz::UTC));
        assert!(parse_timezone("Europe/Belgrade").is_some());
        assert!(parse_timezone("Invalid/Zone").is_none());
    }

    #[test]
    fn test_format_listing_time_utc() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(format_listing_time(&dt, &Tz::UTC), "05.03.2024 07:08:09");
    }

    #[test]
    fn test_format_listing_time_offset() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap();
        let tz: Tz = "Asia/Tokyo".parse().unwrap();
        assert_eq!(format_listing_time(&dt, &tz), "16.01.2024 08:30:00");
    }

    #[test]
    fn test_to_utc_epoch() {
        let dt = to_utc(SystemTime::UNIX_EPOCH);
        assert_eq!(dt.timestamp(), 0);
    }
}
