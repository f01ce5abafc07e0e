//! History queries and index-addressed edits.
//!
//! Entries are addressed by their position in the full history list.
//! Deleting shifts every later index down by one, so callers re-fetch after
//! any mutation. Out-of-range indices produce `{success: false, error}`.

use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db::SharedDocument;
use crate::models::timestamp::{parse_range_end, parse_range_start, parse_timestamp};
use crate::models::{format_timestamp, HistoryAction, HistoryEntry, HistoryUpdate};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub medication_id: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedHistoryEntry {
    pub history_index: usize,
    #[serde(flatten)]
    pub entry: HistoryEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    pub history: Vec<IndexedHistoryEntry>,
    pub total_entries: usize,
}

/// Result of an edit or delete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryMutation {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_entry: Option<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_entry: Option<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryMutation {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            updated_entry: None,
            deleted_entry: None,
            error: Some(error.into()),
        }
    }
}

/// Inclusive bounds; an unparsable bound is ignored.
pub(crate) fn in_range(
    at: NaiveDateTime,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> bool {
    start.map_or(true, |s| at >= s) && end.map_or(true, |e| at <= e)
}

pub fn query_history(doc: &SharedDocument, query: &HistoryQuery) -> HistoryPage {
    let start = query.start_date.as_deref().and_then(parse_range_start);
    let end = query.end_date.as_deref().and_then(parse_range_end);
    let medication_id = query.medication_id.as_deref().filter(|id| !id.is_empty());
    let bounded = start.is_some() || end.is_some();

    let history: Vec<IndexedHistoryEntry> = doc
        .history
        .iter()
        .enumerate()
        .filter(|(_, entry)| medication_id.map_or(true, |id| entry.medication_id == id))
        .filter(|(_, entry)| {
            !bounded || entry.parsed_timestamp().is_some_and(|at| in_range(at, start, end))
        })
        .map(|(history_index, entry)| IndexedHistoryEntry {
            history_index,
            entry: entry.clone(),
        })
        .collect();

    HistoryPage {
        total_entries: history.len(),
        history,
    }
}

fn out_of_range(index: usize, len: usize) -> HistoryMutation {
    HistoryMutation::failed(format!(
        "History index {index} out of range (history has {len} entries)"
    ))
}

/// Merge the provided fields into the entry at `index`.
pub fn edit_history(doc: &mut SharedDocument, index: usize, update: &HistoryUpdate) -> HistoryMutation {
    let len = doc.history.len();
    let Some(entry) = doc.history.get(index) else {
        return out_of_range(index, len);
    };

    let mut edited = entry.clone();
    if let Some(raw) = &update.timestamp {
        match parse_timestamp(raw) {
            Some(at) => edited.timestamp = format_timestamp(at),
            None => return HistoryMutation::failed(format!("Invalid timestamp: {raw}")),
        }
    }
    if let Some(raw) = &update.action {
        match HistoryAction::from_str(raw.trim()) {
            Ok(action) => edited.action = action,
            Err(e) => return HistoryMutation::failed(e.to_string()),
        }
    }
    if let Some(dosage) = update.dosage {
        edited.dosage = Some(dosage);
    }
    if let Some(unit) = &update.dosage_unit {
        edited.dosage_unit = Some(unit.clone());
    }
    if let Some(amount) = update.amount {
        edited.amount = Some(amount);
    }

    doc.history[index] = edited.clone();
    tracing::info!(history_index = index, "History entry edited");
    HistoryMutation {
        success: true,
        updated_entry: Some(edited),
        deleted_entry: None,
        error: None,
    }
}

pub fn delete_history(doc: &mut SharedDocument, index: usize) -> HistoryMutation {
    if index >= doc.history.len() {
        return out_of_range(index, doc.history.len());
    }
    let removed = doc.history.remove(index);
    tracing::info!(history_index = index, medication_id = %removed.medication_id, "History entry deleted");
    HistoryMutation {
        success: true,
        updated_entry: None,
        deleted_entry: Some(removed),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn doc() -> SharedDocument {
        let mut doc = SharedDocument::default();
        doc.history = vec![
            HistoryEntry::new("a", "A", HistoryAction::Taken, at(17, 8)),
            HistoryEntry::new("b", "B", HistoryAction::Skipped, at(18, 8)),
            HistoryEntry::new("a", "A", HistoryAction::Taken, at(19, 8)),
        ];
        doc
    }

    #[test]
    fn query_filters_by_medication_and_keeps_positions() {
        let page = query_history(&doc(), &HistoryQuery {
            medication_id: Some("a".into()),
            ..Default::default()
        });
        assert_eq!(page.total_entries, 2);
        let indices: Vec<usize> = page.history.iter().map(|e| e.history_index).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn query_date_bounds_are_inclusive_whole_days() {
        let page = query_history(&doc(), &HistoryQuery {
            start_date: Some("2026-10-18".into()),
            end_date: Some("2026-10-18".into()),
            ..Default::default()
        });
        assert_eq!(page.total_entries, 1);
        assert_eq!(page.history[0].entry.medication_id, "b");
    }

    #[test]
    fn edit_merges_fields() {
        let mut doc = doc();
        let update = HistoryUpdate {
            action: Some("skipped".into()),
            dosage: Some(2.0),
            ..Default::default()
        };
        let result = edit_history(&mut doc, 0, &update);
        assert!(result.success);
        assert_eq!(doc.history[0].action, HistoryAction::Skipped);
        assert_eq!(doc.history[0].dosage, Some(2.0));
        assert_eq!(doc.history[0].timestamp, "2026-10-17T08:00:00");
    }

    #[test]
    fn edit_out_of_range_leaves_document_unchanged() {
        let mut doc = doc();
        let before = doc.clone();
        let result = edit_history(&mut doc, 99999, &HistoryUpdate::default());
        assert!(!result.success);
        assert!(result.error.is_some());
        assert_eq!(doc, before);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("error").is_some());
        assert!(json.get("updated_entry").is_none());
    }

    #[test]
    fn edit_rejects_bad_values_without_change() {
        let mut doc = doc();
        let before = doc.clone();
        let bad_action = HistoryUpdate { action: Some("eaten".into()), ..Default::default() };
        assert!(!edit_history(&mut doc, 1, &bad_action).success);
        let bad_time = HistoryUpdate { timestamp: Some("noon".into()), ..Default::default() };
        assert!(!edit_history(&mut doc, 1, &bad_time).success);
        assert_eq!(doc, before);
    }

    #[test]
    fn delete_shifts_later_indices() {
        let mut doc = doc();
        let result = delete_history(&mut doc, 0);
        assert!(result.success);
        assert_eq!(result.deleted_entry.unwrap().timestamp, "2026-10-17T08:00:00");
        assert_eq!(doc.history.len(), 2);
        assert_eq!(doc.history[0].medication_id, "b");

        let missing = delete_history(&mut doc, 2);
        assert!(!missing.success);
        assert_eq!(doc.history.len(), 2);
    }
}
