use chrono::{Duration, NaiveDateTime};

use crate::db::MedicationRecord;
use crate::models::{DoseStatus, MAX_ON_TIME_WINDOW_MINUTES};

/// A take this recent reports `taken` when nothing is due.
pub const TAKEN_RECENCY_HOURS: i64 = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvaluation {
    pub status: DoseStatus,
    /// Snoozed right now; reported externally as `scheduled`.
    pub snoozed: bool,
    /// A stored snooze has run out and should be cleared.
    pub snooze_expired: bool,
    pub days_remaining: Option<f64>,
}

/// Average doses per day; zero when the schedule never fires.
pub fn doses_per_day(record: &MedicationRecord) -> f64 {
    record.config.schedule.doses_per_week() as f64 / 7.0
}

/// Pure status derivation. The only side effect it asks for is clearing an
/// expired snooze, reported through `snooze_expired`.
pub fn evaluate_status(
    record: &MedicationRecord,
    next_dose: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> StatusEvaluation {
    let state = &record.state;
    let config = &record.config;

    let snooze_expired = state.snooze_until.is_some_and(|until| until <= now);
    let snoozed = state.snooze_until.is_some_and(|until| until > now);

    let per_day = doses_per_day(record);
    let days_remaining = (per_day > 0.0).then(|| state.remaining_amount / per_day);
    let refill_needed = match days_remaining {
        Some(days) => days <= config.refill_reminder_days,
        None => state.remaining_amount <= 0.0,
    };

    let status = if refill_needed {
        DoseStatus::RefillNeeded
    } else if let Some(next) = next_dose {
        let delta = next - now;
        let window = Duration::minutes(config.on_time_window_minutes.clamp(0, MAX_ON_TIME_WINDOW_MINUTES));
        if snoozed {
            DoseStatus::Scheduled
        } else if delta >= Duration::zero() && delta <= window {
            DoseStatus::Due
        } else if delta < Duration::zero() {
            DoseStatus::Overdue
        } else if state.last_taken.is_some_and(|taken| now - taken < Duration::hours(TAKEN_RECENCY_HOURS)) {
            DoseStatus::Taken
        } else {
            DoseStatus::Scheduled
        }
    } else {
        DoseStatus::Scheduled
    };

    StatusEvaluation {
        status,
        snoozed,
        snooze_expired,
        days_remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FixedTimeSchedule, MedicationConfig, Schedule};
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn record(remaining: f64) -> MedicationRecord {
        let schedule = Schedule::FixedTime(FixedTimeSchedule {
            times: vec!["08:00".into(), "20:00".into()],
            days: crate::models::ALL_DAYS.iter().map(|d| d.to_string()).collect(),
        });
        let mut config = MedicationConfig::new("A", schedule);
        config.refill_amount = remaining;
        MedicationRecord::new(config)
    }

    #[test]
    fn refill_needed_short_circuits() {
        // 2 doses/day, 10 left => 5 days <= 7.
        let rec = record(10.0);
        let eval = evaluate_status(&rec, Some(at(8, 0)), at(7, 50));
        assert_eq!(eval.status, DoseStatus::RefillNeeded);
        assert_eq!(eval.days_remaining, Some(5.0));
    }

    #[test]
    fn due_inside_window_overdue_past() {
        let rec = record(60.0);
        assert_eq!(evaluate_status(&rec, Some(at(8, 0)), at(7, 30)).status, DoseStatus::Due);
        assert_eq!(evaluate_status(&rec, Some(at(8, 0)), at(8, 0)).status, DoseStatus::Due);
        assert_eq!(evaluate_status(&rec, Some(at(8, 0)), at(8, 1)).status, DoseStatus::Overdue);
        assert_eq!(evaluate_status(&rec, Some(at(8, 0)), at(7, 29)).status, DoseStatus::Scheduled);
    }

    #[test]
    fn recent_take_reports_taken() {
        let mut rec = record(60.0);
        rec.state.last_taken = Some(at(8, 5));
        assert_eq!(evaluate_status(&rec, Some(at(20, 0)), at(9, 0)).status, DoseStatus::Taken);
        assert_eq!(evaluate_status(&rec, Some(at(20, 0)), at(14, 6)).status, DoseStatus::Scheduled);
    }

    #[test]
    fn snooze_suppresses_due_and_overdue() {
        let mut rec = record(60.0);
        rec.state.snooze_until = Some(at(8, 15));
        let eval = evaluate_status(&rec, Some(at(8, 0)), at(8, 5));
        assert_eq!(eval.status, DoseStatus::Scheduled);
        assert!(eval.snoozed);
        assert!(!eval.snooze_expired);

        let eval = evaluate_status(&rec, Some(at(8, 0)), at(8, 15));
        assert_eq!(eval.status, DoseStatus::Overdue);
        assert!(eval.snooze_expired);
        assert!(!eval.snoozed);
    }

    #[test]
    fn stored_window_is_capped_at_a_day() {
        let mut rec = record(60.0);
        rec.config.on_time_window_minutes = i64::MAX;
        assert_eq!(evaluate_status(&rec, Some(at(20, 0)), at(9, 0)).status, DoseStatus::Due);
        let next_week = at(9, 0) + Duration::days(7);
        assert_eq!(evaluate_status(&rec, Some(next_week), at(9, 0)).status, DoseStatus::Scheduled);
    }

    #[test]
    fn no_next_dose_is_scheduled() {
        let rec = record(60.0);
        assert_eq!(evaluate_status(&rec, None, at(9, 0)).status, DoseStatus::Scheduled);
    }

    #[test]
    fn zero_dose_schedule_only_needs_refill_when_empty() {
        let mut rec = record(0.0);
        rec.config.schedule = Schedule::FixedTime(FixedTimeSchedule { times: vec![], days: vec![] });
        let eval = evaluate_status(&rec, None, at(9, 0));
        assert_eq!(eval.status, DoseStatus::RefillNeeded);
        assert_eq!(eval.days_remaining, None);

        rec.state.remaining_amount = 3.0;
        assert_eq!(evaluate_status(&rec, None, at(9, 0)).status, DoseStatus::Scheduled);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let mut rec = record(60.0);
        rec.state.snooze_until = Some(at(7, 0));
        let first = evaluate_status(&rec, Some(at(8, 0)), at(7, 45));
        let second = evaluate_status(&rec, Some(at(8, 0)), at(7, 45));
        assert_eq!(first, second);
    }
}
