use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::schedule::{parse_schedule_time, parse_weekday, Schedule};
use super::timestamp::{
    deserialize_amount, deserialize_opt_amount, deserialize_opt_timestamp, deserialize_timestamps,
};

pub const DEFAULT_DOSAGE: f64 = 1.0;
pub const DEFAULT_DOSAGE_UNIT: &str = "each";
pub const DEFAULT_MEDICATION_TYPE: &str = "pill";
pub const DEFAULT_REFILL_REMINDER_DAYS: f64 = 7.0;
pub const DEFAULT_ON_TIME_WINDOW_MINUTES: i64 = 30;
pub const DEFAULT_SNOOZE_MINUTES: i64 = 15;
pub const MAX_SNOOZE_MINUTES: i64 = 7 * 24 * 60;
pub const MAX_ON_TIME_WINDOW_MINUTES: i64 = 24 * 60;
/// Bound on the combined offset of a relative schedule, either direction.
pub const MAX_RELATIVE_OFFSET_MINUTES: i64 = 7 * 24 * 60;

/// Units that carry a measurement and are displayed next to the dosage.
pub const SPECIFIC_DOSAGE_UNITS: &[&str] = &["mL", "mg", "g", "mcg", "tsp", "TBSP", "each", "units", "IU"];

/// Old combined unit strings, split into (medication type, unit).
pub const LEGACY_DOSAGE_UNITS: &[(&str, &str, &str)] = &[
    ("pill(s)", "pill", "each"),
    ("tablet(s)", "tablet", "each"),
    ("capsule(s)", "capsule", "each"),
    ("gelatin_capsule(s)", "gelatin_capsule", "each"),
    ("gummy/gummies", "gummy", "each"),
    ("drop(s)", "drop", "each"),
    ("spray(s)", "spray", "each"),
    ("puff(s)", "puff", "each"),
    ("syrup_mL", "syrup", "mL"),
];

/// Medication forms that read as mass nouns and never pluralise.
const UNCOUNTABLE_TYPES: &[&str] = &["liquid", "syrup", "cream", "powder", "other"];

fn default_dosage() -> f64 {
    DEFAULT_DOSAGE
}
fn default_dosage_unit() -> String {
    DEFAULT_DOSAGE_UNIT.into()
}
fn default_refill_reminder_days() -> f64 {
    DEFAULT_REFILL_REMINDER_DAYS
}
fn default_on_time_window() -> i64 {
    DEFAULT_ON_TIME_WINDOW_MINUTES
}
fn default_snooze() -> i64 {
    DEFAULT_SNOOZE_MINUTES
}
fn default_true() -> bool {
    true
}

/// Medication configuration as supplied by the configuration layer.
///
/// Defaults are applied once, when the record is deserialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "medication_name")]
    pub name: String,
    #[serde(default = "default_dosage", deserialize_with = "deserialize_amount")]
    pub dosage: f64,
    #[serde(default = "default_dosage_unit")]
    pub dosage_unit: String,
    /// `None` marks a record written before types were split from units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication_type: Option<String>,
    #[serde(flatten)]
    pub schedule: Schedule,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub refill_amount: f64,
    #[serde(default = "default_refill_reminder_days", deserialize_with = "deserialize_amount")]
    pub refill_reminder_days: f64,
    #[serde(default, deserialize_with = "deserialize_opt_amount", skip_serializing_if = "Option::is_none")]
    pub current_quantity: Option<f64>,
    #[serde(default)]
    pub use_custom_quantity: bool,
    #[serde(default = "default_on_time_window")]
    pub on_time_window_minutes: i64,
    #[serde(default = "default_snooze")]
    pub snooze_duration_minutes: i64,
    #[serde(default, alias = "notify_services")]
    pub notify_targets: Vec<String>,
    #[serde(default = "default_true")]
    pub enable_automatic_notifications: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl MedicationConfig {
    pub fn new(name: impl Into<String>, schedule: Schedule) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            dosage: DEFAULT_DOSAGE,
            dosage_unit: DEFAULT_DOSAGE_UNIT.into(),
            medication_type: Some(DEFAULT_MEDICATION_TYPE.into()),
            schedule,
            refill_amount: 0.0,
            refill_reminder_days: DEFAULT_REFILL_REMINDER_DAYS,
            current_quantity: None,
            use_custom_quantity: false,
            on_time_window_minutes: DEFAULT_ON_TIME_WINDOW_MINUTES,
            snooze_duration_minutes: DEFAULT_SNOOZE_MINUTES,
            notify_targets: Vec::new(),
            enable_automatic_notifications: true,
            notes: String::new(),
        }
    }

    pub fn medication_type(&self) -> &str {
        self.medication_type.as_deref().unwrap_or(DEFAULT_MEDICATION_TYPE)
    }

    /// Remaining amount a freshly registered medication starts with.
    pub fn initial_remaining(&self) -> f64 {
        match self.current_quantity {
            Some(quantity) if self.use_custom_quantity => quantity.max(0.0),
            _ => self.refill_amount.max(0.0),
        }
    }

    /// Reject configurations the scheduler could never use.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("medication name must not be empty".into());
        }
        if !(self.dosage.is_finite() && self.dosage > 0.0) {
            return Err(format!("dosage must be positive, got {}", self.dosage));
        }
        if self.refill_amount < 0.0 || self.refill_reminder_days < 0.0 {
            return Err("refill amount and reminder days must not be negative".into());
        }
        if !(0..=MAX_ON_TIME_WINDOW_MINUTES).contains(&self.on_time_window_minutes) {
            return Err(format!("on-time window must be between 0 and {MAX_ON_TIME_WINDOW_MINUTES} minutes"));
        }
        if !(1..=MAX_SNOOZE_MINUTES).contains(&self.snooze_duration_minutes) {
            return Err(format!("snooze duration must be between 1 and {MAX_SNOOZE_MINUTES} minutes"));
        }
        match self.schedule.offset_minutes() {
            Some(offset) if offset.unsigned_abs() <= MAX_RELATIVE_OFFSET_MINUTES.unsigned_abs() => {}
            _ => {
                return Err(format!(
                    "relative offset must be within {MAX_RELATIVE_OFFSET_MINUTES} minutes of the reference"
                ))
            }
        }
        if let Some(code) = self.schedule.days().iter().find(|d| parse_weekday(d).is_none()) {
            return Err(format!("unknown weekday code {code:?}"));
        }
        match &self.schedule {
            Schedule::FixedTime(fixed) => {
                if let Some(raw) = fixed.times.iter().find(|t| parse_schedule_time(t).is_none()) {
                    return Err(format!("invalid schedule time {raw:?}, expected HH:MM"));
                }
            }
            Schedule::RelativeMedication(relative) => {
                if relative.reference_medication_id.trim().is_empty() {
                    return Err("reference medication is required".into());
                }
                if relative.reference_medication_id == self.id {
                    return Err("a medication cannot be scheduled relative to itself".into());
                }
            }
            Schedule::RelativeSensor(relative) => {
                if relative.reference_entity_id.trim().is_empty() {
                    return Err("reference sensor is required".into());
                }
            }
        }
        Ok(())
    }

    /// Split a combined legacy unit into type + unit. Returns true if the
    /// record changed.
    pub fn migrate_legacy_unit(&mut self) -> bool {
        if self.medication_type.is_some() {
            return false;
        }
        match LEGACY_DOSAGE_UNITS.iter().find(|(legacy, _, _)| *legacy == self.dosage_unit) {
            Some((_, med_type, unit)) => {
                self.medication_type = Some((*med_type).into());
                self.dosage_unit = (*unit).into();
            }
            None => {
                self.medication_type = Some(DEFAULT_MEDICATION_TYPE.into());
                if !SPECIFIC_DOSAGE_UNITS.contains(&self.dosage_unit.as_str()) {
                    self.dosage_unit = DEFAULT_DOSAGE_UNIT.into();
                }
            }
        }
        true
    }
}

/// Mutable per-medication state stored alongside the configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub remaining_amount: f64,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub last_taken: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub snooze_until: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "deserialize_timestamps")]
    pub missed_doses: Vec<NaiveDateTime>,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub last_notified_occurrence: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "deserialize_timestamps")]
    pub doses_taken_today: Vec<NaiveDateTime>,
}

/// Keep specific measurement units, pull one out of a combined string
/// (`"500MG"` becomes `mg`), keep generic legacy strings, default to `each`.
pub fn normalize_dosage_unit(raw: Option<&str>) -> String {
    let raw = match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return DEFAULT_DOSAGE_UNIT.into(),
    };
    if SPECIFIC_DOSAGE_UNITS.contains(&raw) {
        return raw.into();
    }
    let lowered = raw.to_lowercase();
    if let Some(unit) = SPECIFIC_DOSAGE_UNITS
        .iter()
        .find(|unit| unit.to_lowercase() == lowered)
    {
        return (*unit).into();
    }
    // Longest first so "mcg" wins over "g" and "mg".
    let mut by_length: Vec<&str> = SPECIFIC_DOSAGE_UNITS.iter().copied().filter(|u| *u != "each").collect();
    by_length.sort_by_key(|u| std::cmp::Reverse(u.len()));
    for unit in by_length {
        let unit_lower = unit.to_lowercase();
        if let Some(prefix) = lowered.strip_suffix(unit_lower.as_str()) {
            if !prefix.is_empty() && prefix.trim().chars().all(|c| c.is_ascii_digit() || c == '.') {
                return unit.into();
            }
        }
    }
    raw.into()
}

/// Whole numbers print without a fractional part.
pub fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{value:.2}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Plural form of a medication type, e.g. `gummy` to `gummies`.
pub fn pluralize_type(med_type: &str) -> String {
    let readable = med_type.replace('_', " ");
    if UNCOUNTABLE_TYPES.contains(&med_type) {
        return readable;
    }
    if let Some(stem) = readable.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    if readable.ends_with("ch") || readable.ends_with("sh") || readable.ends_with('s') || readable.ends_with('x') {
        return format!("{readable}es");
    }
    format!("{readable}s")
}

/// Human-readable dose, e.g. `"2 pills"` or `"1.5 tablets (250 mg)"`.
pub fn dosage_display(config: &MedicationConfig) -> String {
    let amount = format_amount(config.dosage);
    let med_type = config.medication_type();
    let noun = if config.dosage == 1.0 {
        med_type.replace('_', " ")
    } else {
        pluralize_type(med_type)
    };
    if config.dosage_unit.is_empty() || config.dosage_unit == DEFAULT_DOSAGE_UNIT {
        format!("{amount} {noun}")
    } else {
        format!("{amount} {noun} ({amount} {})", config.dosage_unit)
    }
}
