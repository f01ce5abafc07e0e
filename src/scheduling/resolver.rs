//! Next-dose resolution for the three schedule variants.
//!
//! Missing reference data is never an error: it resolves to `None`, meaning
//! "not currently schedulable".

use chrono::{Datelike, Duration, NaiveDateTime};

use super::sensors::{SensorHistory, SensorTrigger};
use crate::db::{MedicationRecord, SharedDocument};
use crate::models::{parse_days, parse_times, FixedTimeSchedule, Schedule};
use crate::scheduling::sensors::SensorRegistry;

/// Days scanned past today when looking for the next fixed dose.
const FIXED_LOOKAHEAD_DAYS: i64 = 7;
/// Days a relative candidate may be rolled forward to reach a valid weekday.
const RELATIVE_ROLLFORWARD_DAYS: i64 = 7;

/// Reference anchors a relative schedule may depend on.
pub trait ReferenceData {
    fn last_taken(&self, medication_id: &str) -> Option<NaiveDateTime>;
    fn sensor(&self, entity_id: &str) -> Option<&SensorHistory>;
}

/// References backed by the shared document and the sensor registry.
pub struct DocumentReferences<'a> {
    pub document: &'a SharedDocument,
    pub sensors: &'a SensorRegistry,
}

impl ReferenceData for DocumentReferences<'_> {
    fn last_taken(&self, medication_id: &str) -> Option<NaiveDateTime> {
        self.document.medication(medication_id)?.state.last_taken
    }

    fn sensor(&self, entity_id: &str) -> Option<&SensorHistory> {
        self.sensors.get(entity_id)
    }
}

/// Next dose strictly after `now`, or `None` when not schedulable.
pub fn next_dose(
    record: &MedicationRecord,
    now: NaiveDateTime,
    refs: &dyn ReferenceData,
) -> Option<NaiveDateTime> {
    let schedule = &record.config.schedule;
    match schedule {
        Schedule::FixedTime(fixed) => next_fixed_dose(fixed, now),
        Schedule::RelativeMedication(relative) => {
            let anchor = refs.last_taken(&relative.reference_medication_id)?;
            next_relative_dose(anchor, schedule, now)
        }
        Schedule::RelativeSensor(relative) => {
            let history = refs.sensor(&relative.reference_entity_id)?;
            let anchor = history.anchor(&SensorTrigger::from_schedule(relative))?;
            if relative.avoid_duplicate_triggers
                && record.state.last_taken.is_some_and(|taken| taken >= anchor)
            {
                return None;
            }
            next_relative_dose(anchor, schedule, now)
        }
    }
}

/// Earliest configured time strictly after `now` within the next eight days.
pub fn next_fixed_dose(schedule: &FixedTimeSchedule, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let days = parse_days(&schedule.days);
    let times = parse_times(&schedule.times);
    if days.is_empty() || times.is_empty() {
        return None;
    }
    for offset in 0..=FIXED_LOOKAHEAD_DAYS {
        let date = now.date() + Duration::days(offset);
        if !days.contains(&date.weekday()) {
            continue;
        }
        let earliest = times
            .iter()
            .map(|time| date.and_time(*time))
            .filter(|candidate| *candidate > now)
            .min();
        if earliest.is_some() {
            return earliest;
        }
    }
    None
}

/// `anchor + offset`, rolled forward to an allowed weekday, if still ahead.
pub fn next_relative_dose(
    anchor: NaiveDateTime,
    schedule: &Schedule,
    now: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let days = parse_days(schedule.days());
    if days.is_empty() {
        return None;
    }
    let offset = Duration::try_minutes(schedule.offset_minutes()?)?;
    let mut candidate = anchor.checked_add_signed(offset)?;
    let mut rolled = 0;
    while !days.contains(&candidate.weekday()) {
        if rolled == RELATIVE_ROLLFORWARD_DAYS {
            return None;
        }
        candidate = candidate.checked_add_signed(Duration::days(1))?;
        rolled += 1;
    }
    (candidate > now).then_some(candidate)
}
