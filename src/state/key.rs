//! Dedup key construction.
//!
//! One RDP negotiation emits several 4624 events within seconds. The event
//! time is truncated to a bucket (one minute by default) so they share a key.

use crate::models::AuditRecord;
use chrono::{DateTime, Utc};

/// Default bucket width in seconds
pub const DEFAULT_KEY_GRANULARITY_SECS: u64 = 60;

/// `target_user@source_network_address@<bucket>`; pure and deterministic.
///
/// The bucket renders as `yyyyMMddHHmm` when the granularity is a whole
/// number of minutes, otherwise as `yyyyMMddHHmmss`.
pub fn build_key(record: &AuditRecord, granularity_secs: u64) -> String {
    let bucket = truncate_time(record.time, granularity_secs);
    let stamp = if granularity_secs == 0 || granularity_secs % 60 != 0 {
        bucket.format("%Y%m%d%H%M%S")
    } else {
        bucket.format("%Y%m%d%H%M")
    };
    format!(
        "{}@{}@{}",
        record.target_user, record.source_network_address, stamp
    )
}

fn truncate_time(time: DateTime<Utc>, granularity_secs: u64) -> DateTime<Utc> {
    let granularity = i64::try_from(granularity_secs.max(1)).unwrap_or(i64::MAX);
    let secs = time.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(granularity), 0).unwrap_or(time)
}
