use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::HistoryAction;
use super::timestamp::{deserialize_opt_amount, parse_timestamp};

/// One recorded action. Timestamps stay in their stored text form so that an
/// edited or legacy value never blocks loading; readers parse on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub medication_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub medication_name: String,
    pub timestamp: String,
    pub action: HistoryAction,
    #[serde(default, deserialize_with = "deserialize_opt_amount", skip_serializing_if = "Option::is_none")]
    pub dosage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dosage_unit: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_amount", skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snooze_minutes: Option<i64>,
}

impl HistoryEntry {
    pub fn new(
        medication_id: impl Into<String>,
        medication_name: impl Into<String>,
        action: HistoryAction,
        at: NaiveDateTime,
    ) -> Self {
        Self {
            medication_id: medication_id.into(),
            medication_name: medication_name.into(),
            timestamp: format_timestamp(at),
            action,
            dosage: None,
            dosage_unit: None,
            amount: None,
            snooze_minutes: None,
        }
    }

    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }
}

/// Fields a caller may overwrite on an existing entry. Absent fields are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryUpdate {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_amount")]
    pub dosage: Option<f64>,
    #[serde(default)]
    pub dosage_unit: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_amount")]
    pub amount: Option<f64>,
}

impl HistoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.timestamp.is_none()
            && self.action.is_none()
            && self.dosage.is_none()
            && self.dosage_unit.is_none()
            && self.amount.is_none()
    }
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn entry_serializes_without_absent_fields() {
        let at = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(8, 5, 0).unwrap();
        let entry = HistoryEntry::new("med-1", "Aspirin", HistoryAction::Skipped, at);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["timestamp"], "2026-10-19T08:05:00");
        assert_eq!(json["action"], "skipped");
        assert!(json.get("dosage").is_none());
        assert!(json.get("amount").is_none());
        assert_eq!(entry.parsed_timestamp(), Some(at));
    }

    #[test]
    fn update_accepts_numeric_strings() {
        let update: HistoryUpdate = serde_json::from_str(r#"{"dosage": "2"}"#).unwrap();
        assert_eq!(update.dosage, Some(2.0));
        assert!(!update.is_empty());
        assert!(HistoryUpdate::default().is_empty());
    }
}
