//! Next-generation-time calculation for recurring templates.
//!
//! One pure function, shared by every call site (template creation, edits,
//! and the generation loop), so the cadence rules cannot drift between them.
//! No clock reads: identical inputs always yield identical output.

use crate::types::{RecurrenceConfig, RecurrencePattern};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};

/// Default generation time of day when the config does not specify one.
pub fn default_generation_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).expect("09:00:00 is a valid time")
}

/// Compute when a template should next generate, given the reference instant
/// `from` (the previous scheduled time, or the creation instant for a fresh
/// template).
///
/// - daily: `from` + 1 day.
/// - weekly: the next occurrence of the configured weekday strictly after
///   `from`'s date. A reference already on the target weekday advances a full
///   7 days, never 0.
/// - monthly: the configured day-of-month in the following month, clamped to
///   that month's last day (day 31 in a 30-day month becomes day 30).
/// - custom/unknown patterns: daily fail-safe.
///
/// The configured time of day (default 09:00) is applied in every case, with
/// seconds zeroed.
pub fn compute_next_generation(
    from: DateTime<Utc>,
    pattern: &RecurrencePattern,
    config: &RecurrenceConfig,
) -> DateTime<Utc> {
    let date = from.date_naive();

    let next_date = match pattern {
        RecurrencePattern::Weekly => {
            // 0=Sunday..6=Saturday, Monday when unconfigured
            let target = config.day_of_week.unwrap_or(1).min(6);
            let current = date.weekday().num_days_from_sunday();
            let mut ahead = (target + 7 - current) % 7;
            if ahead == 0 {
                ahead = 7;
            }
            date + Duration::days(ahead as i64)
        }
        RecurrencePattern::Monthly => {
            let (year, month) = if date.month() == 12 {
                (date.year() + 1, 1)
            } else {
                (date.year(), date.month() + 1)
            };
            let wanted = config.day_of_month.unwrap_or(date.day());
            let day = wanted.clamp(1, last_day_of_month(year, month));
            NaiveDate::from_ymd_opt(year, month, day)
                .expect("clamped day is valid for the month")
        }
        RecurrencePattern::Daily | RecurrencePattern::Custom(_) => date + Duration::days(1),
    };

    let configured = config.time_of_day.unwrap_or_else(default_generation_time);
    let time = NaiveTime::from_hms_opt(configured.hour(), configured.minute(), 0)
        .expect("hour and minute come from a valid time");

    Utc.from_utc_datetime(&next_date.and_time(time))
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    for day in (28..=31).rev() {
        if NaiveDate::from_ymd_opt(year, month, day).is_some() {
            return day;
        }
    }
    28
}
