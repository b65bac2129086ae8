use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime};

pub(crate) const DAY_FORMAT: &str = "%Y/%m/%d";
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M";

pub(crate) fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// Parses stored timestamps: the native `YYYY/MM/DD[ HH:MM]` forms plus RFC 3339,
/// which older stores wrote for rescheduled purge dates.
pub(crate) fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT) {
        return Some(at);
    }
    if let Ok(day) = NaiveDate::parse_from_str(trimmed, DAY_FORMAT) {
        return day.and_hms_opt(0, 0, 0);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|at| at.with_timezone(&Local).naive_local())
}

pub(crate) fn parse_day(raw: &str) -> Option<NaiveDate> {
    parse_timestamp(raw).map(|at| at.date())
}

/// `None` for negative spans or when the result leaves chrono's calendar range.
pub(crate) fn add_days(day: NaiveDate, days: i64) -> Option<NaiveDate> {
    let span = u64::try_from(days).ok()?;
    day.checked_add_days(Days::new(span))
}

pub(crate) fn display_watched_at(raw: &str, compact: bool) -> String {
    match parse_timestamp(raw) {
        Some(at) if compact => format_day(at.date()),
        Some(at) => format_timestamp(at),
        None => raw.to_string(),
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}
