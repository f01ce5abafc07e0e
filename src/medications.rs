//! Medication actions — take, skip, refill, snooze and quantity adjustments.
//!
//! Every function mutates the shared document in place and is meant to run
//! inside `DocumentStore::mutate`. An unknown medication id is a silent
//! no-op (`None`), never an error.

use chrono::{Duration, NaiveDateTime};
use serde_json::json;

use crate::activity_log::ActivityRecord;
use crate::db::SharedDocument;
use crate::models::{HistoryAction, HistoryEntry, MAX_SNOOZE_MINUTES};

pub const DOSAGE_STEP: f64 = 0.5;
pub const MIN_DOSAGE: f64 = 0.5;

// ═══════════════════════════════════════════
// Logged actions
// ═══════════════════════════════════════════

/// Record a take: last taken moves to `now`, one dosage leaves the supply.
pub fn take_medication(doc: &mut SharedDocument, id: &str, now: NaiveDateTime) -> Option<ActivityRecord> {
    let record = doc.medications.get_mut(id)?;
    let dosage = record.config.dosage;
    record.state.last_taken = Some(now);
    record.state.remaining_amount = (record.state.remaining_amount - dosage).max(0.0);
    record.state.doses_taken_today.retain(|t| t.date() == now.date());
    record.state.doses_taken_today.push(now);

    let mut entry = HistoryEntry::new(id, record.name(), HistoryAction::Taken, now);
    entry.dosage = Some(dosage);
    entry.dosage_unit = Some(record.config.dosage_unit.clone());
    let activity = ActivityRecord::capture(HistoryAction::Taken, record, now, serde_json::Value::Null);
    doc.history.push(entry);
    tracing::info!(medication_id = %id, remaining = %activity.remaining_amount, "Medication taken");
    Some(activity)
}

pub fn skip_medication(doc: &mut SharedDocument, id: &str, now: NaiveDateTime) -> Option<ActivityRecord> {
    let record = doc.medications.get(id)?;
    let mut entry = HistoryEntry::new(id, record.name(), HistoryAction::Skipped, now);
    entry.dosage = Some(record.config.dosage);
    entry.dosage_unit = Some(record.config.dosage_unit.clone());
    let activity = ActivityRecord::capture(HistoryAction::Skipped, record, now, serde_json::Value::Null);
    doc.history.push(entry);
    tracing::info!(medication_id = %id, "Medication skipped");
    Some(activity)
}

/// Reset the supply to the configured refill amount.
pub fn refill_medication(doc: &mut SharedDocument, id: &str, now: NaiveDateTime) -> Option<ActivityRecord> {
    let record = doc.medications.get_mut(id)?;
    let amount = record.config.refill_amount.max(0.0);
    record.state.remaining_amount = amount;

    let mut entry = HistoryEntry::new(id, record.name(), HistoryAction::Refilled, now);
    entry.amount = Some(amount);
    let activity = ActivityRecord::capture(HistoryAction::Refilled, record, now, json!({ "amount": amount }));
    doc.history.push(entry);
    tracing::info!(medication_id = %id, amount, "Medication refilled");
    Some(activity)
}

/// Suppress reminders for `duration_minutes`, or the configured default
/// when no positive override is given. Capped at [`MAX_SNOOZE_MINUTES`].
pub fn snooze_medication(
    doc: &mut SharedDocument,
    id: &str,
    duration_minutes: Option<i64>,
    now: NaiveDateTime,
) -> Option<ActivityRecord> {
    let record = doc.medications.get_mut(id)?;
    let minutes = duration_minutes
        .filter(|m| *m > 0)
        .unwrap_or(record.config.snooze_duration_minutes)
        .clamp(1, MAX_SNOOZE_MINUTES);
    let until = now.checked_add_signed(Duration::minutes(minutes))?;
    record.state.snooze_until = Some(until);

    let mut entry = HistoryEntry::new(id, record.name(), HistoryAction::Snoozed, now);
    entry.snooze_minutes = Some(minutes);
    let activity = ActivityRecord::capture(
        HistoryAction::Snoozed,
        record,
        now,
        json!({ "snooze_duration_minutes": minutes }),
    );
    doc.history.push(entry);
    tracing::info!(medication_id = %id, minutes, "Medication snoozed");
    Some(activity)
}

// ═══════════════════════════════════════════
// Quantity adjustments (not logged to history)
// ═══════════════════════════════════════════

pub fn increment_dosage(doc: &mut SharedDocument, id: &str) -> Option<f64> {
    let record = doc.medications.get_mut(id)?;
    record.config.dosage += DOSAGE_STEP;
    Some(record.config.dosage)
}

pub fn decrement_dosage(doc: &mut SharedDocument, id: &str) -> Option<f64> {
    let record = doc.medications.get_mut(id)?;
    record.config.dosage = (record.config.dosage - DOSAGE_STEP).max(MIN_DOSAGE);
    Some(record.config.dosage)
}

/// Add one dosage to the supply.
pub fn increment_remaining(doc: &mut SharedDocument, id: &str) -> Option<f64> {
    let record = doc.medications.get_mut(id)?;
    record.state.remaining_amount += record.config.dosage;
    Some(record.state.remaining_amount)
}

pub fn decrement_remaining(doc: &mut SharedDocument, id: &str) -> Option<f64> {
    let record = doc.medications.get_mut(id)?;
    record.state.remaining_amount = (record.state.remaining_amount - record.config.dosage).max(0.0);
    Some(record.state.remaining_amount)
}
