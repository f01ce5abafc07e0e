//! Adherence statistics folded from the history log.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::db::MedicationRecord;
use crate::history::in_range;
use crate::models::timestamp::{parse_range_end, parse_range_start};
use crate::models::{parse_days, parse_times, HistoryAction, HistoryEntry, Schedule};

/// Range used when a query gives neither bound.
pub const DEFAULT_RANGE_DAYS: i64 = 30;
const UNKNOWN_MEDICATION: &str = "Unknown";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatisticsQuery {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub medication_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MedicationStatistics {
    pub name: String,
    pub taken_count: usize,
    pub skipped_count: usize,
    pub refilled_count: usize,
    pub snoozed_count: usize,
    pub total_count: usize,
    pub taken_on_time_count: usize,
    pub taken_late_count: usize,
    pub on_time_percentage: f64,
    pub taken_times: Vec<String>,
    pub skipped_times: Vec<String>,
    pub snoozed_times: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyCount {
    pub taken: usize,
    pub skipped: usize,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub total_entries: usize,
    pub medications: BTreeMap<String, MedicationStatistics>,
    pub daily_counts: BTreeMap<String, BTreeMap<String, DailyCount>>,
    pub action_counts: BTreeMap<String, usize>,
}

/// Whether a take at `taken_at` was on time. `None` when the schedule has
/// no fixed times to compare against.
pub fn classify_take(record: &MedicationRecord, taken_at: NaiveDateTime) -> Option<bool> {
    let Schedule::FixedTime(fixed) = &record.config.schedule else {
        return None;
    };
    let times = parse_times(&fixed.times);
    if times.is_empty() {
        return None;
    }
    if !parse_days(&fixed.days).contains(&taken_at.weekday()) {
        return Some(false);
    }
    let window = record.config.on_time_window_minutes.max(0);
    let closest = times
        .iter()
        .map(|t| (taken_at - taken_at.date().and_time(*t)).num_minutes().abs())
        .min()?;
    Some(closest <= window)
}

fn resolve_range(query: &StatisticsQuery, now: NaiveDateTime) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
    let start = query.start_date.as_deref().and_then(parse_range_start);
    let end = query.end_date.as_deref().and_then(parse_range_end);
    if start.is_none() && end.is_none() {
        return (Some(now - Duration::days(DEFAULT_RANGE_DAYS)), Some(now));
    }
    (start, end)
}

/// Fold history into per-medication and per-day counts.
///
/// The result is always well formed; with no matching entries every map is
/// empty and every count zero.
pub fn aggregate(
    history: &[HistoryEntry],
    medications: &BTreeMap<String, MedicationRecord>,
    query: &StatisticsQuery,
    now: NaiveDateTime,
) -> Statistics {
    let (start, end) = resolve_range(query, now);
    let only = query.medication_id.as_deref().filter(|id| !id.is_empty());
    let mut stats = Statistics {
        start_date: start,
        end_date: end,
        ..Statistics::default()
    };

    for entry in history {
        if only.is_some_and(|id| entry.medication_id != id) {
            continue;
        }
        let Some(at) = entry.parsed_timestamp() else {
            continue;
        };
        if !in_range(at, start, end) {
            continue;
        }

        let record = medications.get(&entry.medication_id);
        let name = if !entry.medication_name.is_empty() {
            entry.medication_name.clone()
        } else {
            record.map_or_else(|| UNKNOWN_MEDICATION.to_string(), |r| r.name().to_string())
        };

        stats.total_entries += 1;
        *stats.action_counts.entry(entry.action.as_str().to_string()).or_default() += 1;

        let med = stats
            .medications
            .entry(entry.medication_id.clone())
            .or_insert_with(|| MedicationStatistics {
                name: name.clone(),
                ..MedicationStatistics::default()
            });
        med.total_count += 1;
        match entry.action {
            HistoryAction::Taken => {
                med.taken_count += 1;
                med.taken_times.push(entry.timestamp.clone());
                match record.and_then(|r| classify_take(r, at)) {
                    Some(true) => med.taken_on_time_count += 1,
                    Some(false) => med.taken_late_count += 1,
                    None => {}
                }
            }
            HistoryAction::Skipped => {
                med.skipped_count += 1;
                med.skipped_times.push(entry.timestamp.clone());
            }
            HistoryAction::Refilled => med.refilled_count += 1,
            HistoryAction::Snoozed => {
                med.snoozed_count += 1;
                med.snoozed_times.push(entry.timestamp.clone());
            }
        }

        let day = stats
            .daily_counts
            .entry(at.date().format("%Y-%m-%d").to_string())
            .or_default()
            .entry(entry.medication_id.clone())
            .or_insert_with(|| DailyCount { name, ..DailyCount::default() });
        match entry.action {
            HistoryAction::Taken => day.taken += 1,
            HistoryAction::Skipped => day.skipped += 1,
            HistoryAction::Refilled | HistoryAction::Snoozed => {}
        }
    }

    for med in stats.medications.values_mut() {
        let classified = med.taken_on_time_count + med.taken_late_count;
        if classified > 0 {
            let pct = med.taken_on_time_count as f64 * 100.0 / classified as f64;
            med.on_time_percentage = (pct * 10.0).round() / 10.0;
        }
    }

    stats
}
