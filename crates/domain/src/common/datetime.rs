//! Timestamp helpers.
//!
//! Player and session timestamps are stored in a fixed UTC-8 offset ("PST"),
//! never adjusted for daylight saving. Values written this way are not
//! timezone-aware and must not be compared against true local time.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};

/// Storage format for every timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const PST_OFFSET_SECS: i32 = 8 * 3600;

fn pst() -> FixedOffset {
    // 8h is always within FixedOffset's +-24h range.
    FixedOffset::west_opt(PST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Formats `now` in the fixed PST offset.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use rphud_domain::common::pst_timestamp;
///
/// let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
/// assert_eq!(pst_timestamp(now), "2024-01-15 02:30:00");
/// ```
pub fn pst_timestamp(now: DateTime<Utc>) -> String {
    now.with_timezone(&pst()).format(TIMESTAMP_FORMAT).to_string()
}

/// Formats `now + ttl` in the fixed PST offset.
pub fn pst_timestamp_after(now: DateTime<Utc>, ttl: Duration) -> String {
    pst_timestamp(now + ttl)
}

/// Parses a stored PST timestamp back into UTC.
pub fn parse_pst_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let naive = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)?;
    Ok(pst()
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive)))
}
