//! Scheduling — next-dose resolution, status, missed doses, sensor anchors.
//!
//! Everything here is pure computation over a document snapshot; the
//! engine in `core_state` owns locking and persistence.

pub mod missed;
pub mod resolver;
pub mod sensors;
pub mod status;

pub use missed::{detect_missed_doses, MAX_MISSED_DOSES, MISSED_DOSE_GRACE_MINUTES};
pub use resolver::{next_dose, DocumentReferences, ReferenceData};
pub use sensors::{SensorHistory, SensorRegistry, SensorTrigger};
pub use status::{evaluate_status, StatusEvaluation};

use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;

use crate::db::MedicationRecord;
use crate::models::{dosage_display, parse_days, parse_times, DoseStatus, Schedule};

/// Computed status of one medication at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MedicationView {
    pub medication_id: String,
    pub name: String,
    pub status: DoseStatus,
    pub snoozed: bool,
    pub schedule_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_dose: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_taken: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snooze_until: Option<NaiveDateTime>,
    pub missed_doses: Vec<NaiveDateTime>,
    pub remaining_amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<f64>,
    pub dosage_display: String,
    pub doses_taken_today: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_scheduled_ratio: Option<String>,
    pub automatic_notifications: bool,
    #[serde(skip)]
    pub snooze_expired: bool,
}

/// Fixed-time doses scheduled on the calendar day of `now`.
pub fn doses_scheduled_today(schedule: &Schedule, now: NaiveDateTime) -> Option<usize> {
    let Schedule::FixedTime(fixed) = schedule else {
        return None;
    };
    let today = now.date().weekday();
    if parse_days(&fixed.days).contains(&today) {
        Some(parse_times(&fixed.times).len())
    } else {
        Some(0)
    }
}

/// Resolve, evaluate and detect missed doses for one medication.
pub fn evaluate_medication(
    record: &MedicationRecord,
    refs: &dyn ReferenceData,
    now: NaiveDateTime,
) -> MedicationView {
    let next = next_dose(record, now, refs);
    let evaluation = evaluate_status(record, next, now);
    let missed = detect_missed_doses(&record.config.schedule, record.state.last_taken, now);
    let taken_today = record
        .state
        .doses_taken_today
        .iter()
        .filter(|t| t.date() == now.date())
        .count();
    let ratio = doses_scheduled_today(&record.config.schedule, now)
        .map(|scheduled| format!("{taken_today}/{scheduled}"));

    tracing::debug!(
        medication_id = %record.id(),
        status = %evaluation.status,
        next_dose = ?next,
        "Evaluated medication"
    );

    MedicationView {
        medication_id: record.id().to_string(),
        name: record.name().to_string(),
        status: evaluation.status,
        snoozed: evaluation.snoozed,
        schedule_type: record.config.schedule.kind(),
        next_dose: next,
        last_taken: record.state.last_taken,
        snooze_until: if evaluation.snooze_expired { None } else { record.state.snooze_until },
        missed_doses: missed,
        remaining_amount: record.state.remaining_amount,
        days_remaining: evaluation.days_remaining,
        dosage_display: dosage_display(&record.config),
        doses_taken_today: taken_today,
        taken_scheduled_ratio: ratio,
        automatic_notifications: record.config.enable_automatic_notifications,
        snooze_expired: evaluation.snooze_expired,
    }
}
