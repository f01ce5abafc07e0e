use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

pub const ALL_DAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

fn default_days() -> Vec<String> {
    ALL_DAYS.iter().map(|d| d.to_string()).collect()
}

fn default_true() -> bool {
    true
}

/// Schedule variant, tagged by `schedule_type` in the stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schedule_type", rename_all = "snake_case")]
pub enum Schedule {
    FixedTime(FixedTimeSchedule),
    RelativeMedication(RelativeMedicationSchedule),
    RelativeSensor(RelativeSensorSchedule),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedTimeSchedule {
    #[serde(default, alias = "schedule_times")]
    pub times: Vec<String>,
    #[serde(default = "default_days", alias = "schedule_days")]
    pub days: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelativeMedicationSchedule {
    #[serde(default, alias = "relative_to_medication")]
    pub reference_medication_id: String,
    #[serde(default)]
    pub offset_hours: i64,
    #[serde(default)]
    pub offset_minutes: i64,
    #[serde(default = "default_days", alias = "schedule_days")]
    pub days: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelativeSensorSchedule {
    #[serde(default, alias = "relative_to_sensor")]
    pub reference_entity_id: String,
    #[serde(default)]
    pub offset_hours: i64,
    #[serde(default)]
    pub offset_minutes: i64,
    #[serde(default = "default_days", alias = "schedule_days")]
    pub days: Vec<String>,
    #[serde(default, alias = "sensor_trigger_value", skip_serializing_if = "Option::is_none")]
    pub trigger_value: Option<String>,
    #[serde(default, alias = "sensor_trigger_attribute", skip_serializing_if = "Option::is_none")]
    pub trigger_attribute: Option<String>,
    #[serde(default = "default_true")]
    pub avoid_duplicate_triggers: bool,
    #[serde(default = "default_true")]
    pub ignore_unavailable: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Self::FixedTime(FixedTimeSchedule {
            times: Vec::new(),
            days: default_days(),
        })
    }
}

impl Schedule {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FixedTime(_) => "fixed_time",
            Self::RelativeMedication(_) => "relative_medication",
            Self::RelativeSensor(_) => "relative_sensor",
        }
    }

    pub fn days(&self) -> &[String] {
        match self {
            Self::FixedTime(s) => &s.days,
            Self::RelativeMedication(s) => &s.days,
            Self::RelativeSensor(s) => &s.days,
        }
    }

    /// Signed offset after reduction to minutes; zero for fixed schedules.
    /// `None` when the hours and minutes do not fit in an `i64`.
    pub fn offset_minutes(&self) -> Option<i64> {
        let (hours, minutes) = match self {
            Self::FixedTime(_) => return Some(0),
            Self::RelativeMedication(s) => (s.offset_hours, s.offset_minutes),
            Self::RelativeSensor(s) => (s.offset_hours, s.offset_minutes),
        };
        hours.checked_mul(60)?.checked_add(minutes)
    }

    /// Doses per week used for refill forecasting.
    ///
    /// Relative schedules count one dose per scheduled day.
    pub fn doses_per_week(&self) -> usize {
        let days = parse_days(self.days()).len();
        match self {
            Self::FixedTime(s) => parse_times(&s.times).len() * days,
            Self::RelativeMedication(_) | Self::RelativeSensor(_) => days,
        }
    }
}

/// Accepts short (`mon`) and long (`monday`) codes in any case.
pub fn parse_weekday(code: &str) -> Option<Weekday> {
    match code.trim().to_ascii_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tues" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thur" | "thurs" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn weekday_code(day: Weekday) -> &'static str {
    ALL_DAYS[day.num_days_from_monday() as usize]
}

/// Valid weekdays in the given codes, deduplicated. Unknown codes are dropped.
pub fn parse_days(days: &[String]) -> Vec<Weekday> {
    let mut parsed: Vec<Weekday> = Vec::with_capacity(days.len());
    for code in days {
        match parse_weekday(code) {
            Some(day) if !parsed.contains(&day) => parsed.push(day),
            Some(_) => {}
            None => tracing::debug!(code = %code, "Ignoring unknown weekday code"),
        }
    }
    parsed
}

/// `HH:MM` or `HH:MM:SS`.
pub fn parse_schedule_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

/// Valid times in configured order, deduplicated.
pub fn parse_times(times: &[String]) -> Vec<NaiveTime> {
    let mut parsed: Vec<NaiveTime> = Vec::with_capacity(times.len());
    for raw in times {
        match parse_schedule_time(raw) {
            Some(t) if !parsed.contains(&t) => parsed.push(t),
            Some(_) => {}
            None => tracing::warn!(value = %raw, "Unparsable schedule time, ignoring"),
        }
    }
    parsed
}
