//! Timestamp utilities
//!
//! Calendar-day logic (today's inspections, expiry checks, schedules) runs in
//! Korea Standard Time. Stored timestamps are UTC RFC 3339 strings.

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};

/// KST offset in seconds (UTC+09:00)
pub const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Korea Standard Time offset
pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_SECS).expect("KST offset is within range")
}

/// Today's date in KST
pub fn today_kst() -> NaiveDate {
    now().with_timezone(&kst()).date_naive()
}

/// Canonical storage form: `2025-09-20T04:30:00Z`
pub fn to_db_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// UTC instant at which the given KST calendar day starts
pub fn kst_day_start_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .and_then(|naive| naive.and_local_timezone(kst()).single())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(now)
}
