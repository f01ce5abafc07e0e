use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDateTime};

use crate::models::{parse_days, parse_times, Schedule};

/// A dose becomes missed once it is this far in the past. Independent of
/// the per-medication on-time window.
pub const MISSED_DOSE_GRACE_MINUTES: i64 = 30;
/// Only doses scheduled within this horizon are considered.
pub const MISSED_DOSE_LOOKBACK_HOURS: i64 = 24;
pub const MAX_MISSED_DOSES: usize = 5;

/// Fixed-time doses in the last 24 hours that were not followed by a take.
///
/// Ascending, deduplicated, at most [`MAX_MISSED_DOSES`] (the most recent).
/// Relative schedules have no missed-dose concept and yield nothing.
pub fn detect_missed_doses(
    schedule: &Schedule,
    last_taken: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> Vec<NaiveDateTime> {
    let Schedule::FixedTime(fixed) = schedule else {
        return Vec::new();
    };
    let days = parse_days(&fixed.days);
    let times = parse_times(&fixed.times);
    let grace = Duration::minutes(MISSED_DOSE_GRACE_MINUTES);
    let lookback = Duration::hours(MISSED_DOSE_LOOKBACK_HOURS);

    let mut missed = BTreeSet::new();
    for offset in [1, 0] {
        let date = now.date() - Duration::days(offset);
        if !days.contains(&date.weekday()) {
            continue;
        }
        for time in &times {
            let dose = date.and_time(*time);
            let age = now - dose;
            if age <= Duration::zero() || age > lookback || age <= grace {
                continue;
            }
            if last_taken.is_some_and(|taken| taken >= dose) {
                continue;
            }
            missed.insert(dose);
        }
    }

    let skip = missed.len().saturating_sub(MAX_MISSED_DOSES);
    missed.into_iter().skip(skip).collect()
}
