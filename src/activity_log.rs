//! Activity log — append-only CSV trail of every medication action.
//!
//! Each action is written twice: to a global log covering all medications
//! and to a per-medication log named after the medication.
//!
//! **Output structure**:
//! ```text
//! {logs_dir}/
//!   dosekeeper_all_medications_log.csv
//!   {sanitised_name}_log.csv
//! ```
//!
//! Best effort throughout: write failures are logged at `warn` and never
//! reach the caller.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;

use crate::db::MedicationRecord;
use crate::models::{format_amount, format_timestamp, HistoryAction};

// ──────────────────────────────────────────────
// Records
// ──────────────────────────────────────────────

pub const GLOBAL_LOG_FILENAME: &str = "dosekeeper_all_medications_log.csv";
const PER_MEDICATION_SUFFIX: &str = "_log.csv";

/// One CSV row. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRecord {
    pub timestamp: String,
    pub action: String,
    pub medication_id: String,
    pub medication_name: String,
    pub dosage: String,
    pub dosage_unit: String,
    pub remaining_amount: String,
    pub refill_amount: String,
    pub snooze_until: String,
    pub details_json: String,
}

impl ActivityRecord {
    /// Row describing `record` right after `action` was applied.
    pub fn capture(
        action: HistoryAction,
        record: &MedicationRecord,
        at: NaiveDateTime,
        details: serde_json::Value,
    ) -> Self {
        let details_json = if details.is_null() {
            String::new()
        } else {
            details.to_string()
        };
        Self {
            timestamp: format_timestamp(at),
            action: action.log_label().to_string(),
            medication_id: record.id().to_string(),
            medication_name: record.name().to_string(),
            dosage: format_amount(record.config.dosage),
            dosage_unit: record.config.dosage_unit.clone(),
            remaining_amount: format_amount(record.state.remaining_amount),
            refill_amount: format_amount(record.config.refill_amount),
            snooze_until: record.state.snooze_until.map(format_timestamp).unwrap_or_default(),
            details_json,
        }
    }
}

/// Fire-and-forget sink for activity rows.
pub trait ActivitySink: Send + Sync {
    fn record(&self, entry: &ActivityRecord);
}

/// Discards every row.
pub struct NullActivityLog;

impl ActivitySink for NullActivityLog {
    fn record(&self, _entry: &ActivityRecord) {}
}

// ──────────────────────────────────────────────
// CSV writer
// ──────────────────────────────────────────────

pub struct CsvActivityLog {
    dir: PathBuf,
}

impl CsvActivityLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn global_log_path(&self) -> PathBuf {
        self.dir.join(GLOBAL_LOG_FILENAME)
    }

    pub fn medication_log_path(&self, medication_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}{PER_MEDICATION_SUFFIX}", sanitize_filename(medication_name)))
    }

    fn append(path: &Path, entry: &ActivityRecord) -> Result<(), csv::Error> {
        let is_new = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        writer.serialize(entry)?;
        writer.flush()?;
        Ok(())
    }
}

impl ActivitySink for CsvActivityLog {
    fn record(&self, entry: &ActivityRecord) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!(
                path = %self.dir.display(),
                error = %e,
                "Activity log: failed to create directory"
            );
            return;
        }
        for path in [self.global_log_path(), self.medication_log_path(&entry.medication_name)] {
            if let Err(e) = Self::append(&path, entry) {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Activity log: failed to append row"
                );
            }
        }
    }
}

/// File-system safe form of a medication name. Empty names become `unknown`.
pub fn sanitize_filename(name: &str) -> String {
    static WHITESPACE: OnceLock<Option<Regex>> = OnceLock::new();
    static UNSAFE: OnceLock<Option<Regex>> = OnceLock::new();
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").ok());
    let unsafe_chars = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").ok());

    let trimmed = name.trim();
    let spaced = match whitespace {
        Some(re) => re.replace_all(trimmed, "_").into_owned(),
        None => trimmed.to_string(),
    };
    let cleaned = match unsafe_chars {
        Some(re) => re.replace_all(&spaced, "").into_owned(),
        None => spaced,
    };
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}
