//! GPS hour to UTC conversion.
//!
//! EPO sets are indexed by GPS hour: hours elapsed since the GPS epoch
//! (1980-01-06). The receiver protocol reports validity windows in UTC,
//! offset from the Unix epoch by [`GPS_UNIX_OFFSET_SECONDS`].

use chrono::{DateTime, Utc};

/// Offset from GPS hour zero to the Unix epoch, in seconds.
///
/// This is the value the receiver firmware uses; it bakes in the GPS/UTC
/// leap-second difference at the time of the format's definition.
pub const GPS_UNIX_OFFSET_SECONDS: i64 = 315_964_786;

/// Seconds per GPS hour.
pub const SECONDS_PER_HOUR: i64 = 3600;

/// Convert a GPS hour index to a UTC timestamp.
pub fn gps_hour_to_utc(gps_hour: u32) -> DateTime<Utc> {
    let secs = i64::from(gps_hour) * SECONDS_PER_HOUR + GPS_UNIX_OFFSET_SECONDS;
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Render a timestamp as `YYYY-MM-DD HH:MM:SS` for progress reporting.
pub fn format_utc(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Current UTC time in the compact `yyyymmddhhmmss` form the PMTK740 and
/// PMTK741 commands expect.
pub fn current_utc_stamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}
