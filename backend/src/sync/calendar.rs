use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc, Weekday};

use crate::error::AppError;

/// Day labels indexed by `Weekday::num_days_from_monday`.
const DAY_LABELS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Day order of the week view returned to clients.
pub const WEEK_VIEW_DAYS: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

pub fn day_label(weekday: Weekday) -> &'static str {
    DAY_LABELS[weekday.num_days_from_monday() as usize]
}

pub fn date_label(date: NaiveDate) -> &'static str {
    day_label(date.weekday())
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (reduced to its UTC date).
pub fn parse_sync_date(raw: &str) -> Result<NaiveDate, AppError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(AppError::Validation("date is required".to_string()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .map_err(|_| AppError::Validation(format!("invalid date '{}', expected YYYY-MM-DD", value)))
}

/// The seven dates starting at `start`, minus any that fall on `excluded`.
pub fn week_dates(start: NaiveDate, excluded: Option<Weekday>) -> Vec<NaiveDate> {
    (0..7)
        .filter_map(|offset| start.checked_add_days(Days::new(offset)))
        .filter(|date| Some(date.weekday()) != excluded)
        .collect()
}

/// Next instant strictly after `now` at time-of-day `at` that does not fall on `excluded`.
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime, excluded: Option<Weekday>) -> NaiveDateTime {
    let mut candidate = now.date().and_time(at);
    if candidate <= now {
        candidate += TimeDelta::days(1);
    }
    while Some(candidate.weekday()) == excluded {
        candidate += TimeDelta::days(1);
    }
    candidate
}
