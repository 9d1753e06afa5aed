//! Inspection scheduling helpers

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};

use crate::time::kst;

/// Hour used when a schedule is created without a time of day
pub const DEFAULT_SCHEDULE_HOUR: u32 = 9;

/// Minimum length for identifiers that are not email addresses
pub const MIN_ASSIGNEE_ID_LEN: usize = 3;

/// Build the KST timestamp for a schedule from `YYYY-MM-DD` and optional `HH:MM`
///
/// A missing or blank time means 09:00. Returns `None` when the date is not a
/// real calendar date or the time is not strictly `HH:MM`.
pub fn build_scheduled_timestamp(date: &str, time: Option<&str>) -> Option<DateTime<FixedOffset>> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;

    let time = match time.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => parse_hh_mm(t)?,
        None => NaiveTime::from_hms_opt(DEFAULT_SCHEDULE_HOUR, 0, 0)?,
    };

    date.and_time(time).and_local_timezone(kst()).single()
}

fn parse_hh_mm(value: &str) -> Option<NaiveTime> {
    let (hour, minute) = value.split_once(':')?;
    if hour.len() != 2 || minute.len() != 2 {
        return None;
    }
    if !hour.chars().chain(minute.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)
}

/// Whether `value` can name a schedule assignee (email or user id)
pub fn is_valid_assignee_identifier(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return false;
    }
    if value.contains('@') {
        return is_email_shaped(value);
    }
    value.chars().count() >= MIN_ASSIGNEE_ID_LEN
}

fn is_email_shaped(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    // Domain needs an interior dot: "b.kr" yes, "b", ".kr" and "b." no
    match domain.find('.') {
        Some(idx) => idx > 0 && !domain.ends_with('.') && !domain.contains(".."),
        None => false,
    }
}
