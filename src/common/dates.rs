use chrono::NaiveDate;

use super::constants::{COMPACT_DATE_FORMAT, ISO_DATE_FORMAT};

/// Absolute number of calendar days between two dates
pub fn calendar_day_distance(a: NaiveDate, b: NaiveDate) -> u32 {
    (a - b).num_days().unsigned_abs() as u32
}

/// Earliest date still inside a lookback of `days` calendar days ending at `target`
pub fn lookback_start(target: NaiveDate, days: u32) -> NaiveDate {
    target
        .checked_sub_days(chrono::Days::new(days as u64))
        .unwrap_or(NaiveDate::MIN)
}

/// Parse a trade date as supplied by the serving layer.
///
/// Accepts both the compact `YYYYMMDD` form used in raw exchange exports and the
/// ISO `YYYY-MM-DD` form used once rows have been normalized.
pub fn parse_trade_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, ISO_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(trimmed, COMPACT_DATE_FORMAT))
        .ok()
}

/// Format a date the way snapshots are keyed in serialized output
pub fn format_trade_date(date: NaiveDate) -> String {
    date.format(ISO_DATE_FORMAT).to_string()
}
