//! Time helpers.
//!
//! Audit sources disagree on timestamp encoding: WMI hands out CIM datetimes,
//! exports use RFC 3339, some shippers emit Unix seconds.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Timelike, Utc};

pub fn now_timestamp_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an event generation time, truncated to whole seconds.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (taken as UTC), CIM datetime
/// (`yyyymmddHHMMSS.ffffff+UUU`, offset in minutes) and Unix seconds.
pub fn parse_event_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let parsed = if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        Some(dt.with_timezone(&Utc))
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        Some(Utc.from_utc_datetime(&naive))
    } else if value.len() <= 12 && value.bytes().all(|b| b.is_ascii_digit()) {
        value
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    } else {
        parse_cim_datetime(value)
    };

    parsed.and_then(|dt| dt.with_nanosecond(0))
}

fn parse_cim_datetime(value: &str) -> Option<DateTime<Utc>> {
    let digits = value.get(..14)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S").ok()?;

    // Offset suffix is signed minutes from UTC, e.g. "+180" for UTC+3
    let offset_minutes = value
        .get(21..)
        .and_then(|suffix| suffix.parse::<i32>().ok())
        .unwrap_or(0);
    let offset = FixedOffset::east_opt(offset_minutes.checked_mul(60)?)?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
