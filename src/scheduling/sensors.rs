//! Sensor reference tracking for sensor-relative schedules.
//!
//! Reports arrive as full state snapshots; a change is recorded only when
//! the state or an attribute differs from the previous report.

use std::collections::{HashMap, VecDeque};

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::models::RelativeSensorSchedule;

pub const MAX_SENSOR_HISTORY_CHANGES: usize = 20;

const UNAVAILABLE_STATES: &[&str] = &["unavailable", "unknown"];

pub fn is_unavailable(state: &str) -> bool {
    UNAVAILABLE_STATES.iter().any(|s| s.eq_ignore_ascii_case(state))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorChange {
    pub state: String,
    pub attributes: Map<String, Value>,
    pub at: NaiveDateTime,
    /// False when only attributes changed.
    pub state_changed: bool,
}

/// Filters deciding which recorded change anchors a schedule.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorTrigger<'a> {
    pub value: Option<&'a str>,
    pub attribute: Option<&'a str>,
    pub ignore_unavailable: bool,
}

impl<'a> SensorTrigger<'a> {
    pub fn from_schedule(schedule: &'a RelativeSensorSchedule) -> Self {
        fn non_empty(value: &Option<String>) -> Option<&str> {
            value.as_deref().map(str::trim).filter(|v| !v.is_empty())
        }
        Self {
            value: non_empty(&schedule.trigger_value),
            attribute: non_empty(&schedule.trigger_attribute),
            ignore_unavailable: schedule.ignore_unavailable,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SensorHistory {
    pub state: String,
    pub attributes: Map<String, Value>,
    pub last_changed: NaiveDateTime,
    changes: VecDeque<SensorChange>,
}

fn attribute_text(attributes: &Map<String, Value>, name: &str) -> Option<String> {
    attributes.get(name).map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

impl SensorHistory {
    pub fn changes(&self) -> impl Iterator<Item = &SensorChange> {
        self.changes.iter()
    }

    /// Timestamp of the most recent change matching the trigger.
    ///
    /// With `ignore_unavailable`, unavailable reports are invisible: a
    /// sensor returning to the state it held before dropping out is not a
    /// new transition.
    pub fn anchor(&self, trigger: &SensorTrigger<'_>) -> Option<NaiveDateTime> {
        if trigger.ignore_unavailable && is_unavailable(&self.state) {
            return None;
        }
        for (idx, change) in self.changes.iter().enumerate().rev() {
            if trigger.ignore_unavailable && is_unavailable(&change.state) {
                continue;
            }
            let mut earlier = self.changes.range(..idx).rev();
            let previous = if trigger.ignore_unavailable {
                earlier.find(|p| !is_unavailable(&p.state))
            } else {
                earlier.next()
            };
            let state_changed = if trigger.ignore_unavailable {
                previous.map_or(true, |p| p.state != change.state)
            } else {
                change.state_changed
            };
            let matched = match trigger.attribute {
                Some(attribute) => {
                    let Some(value) = attribute_text(&change.attributes, attribute) else {
                        continue;
                    };
                    let prev_value = previous.and_then(|p| attribute_text(&p.attributes, attribute));
                    prev_value.as_deref() != Some(value.as_str())
                        && trigger.value.map_or(true, |wanted| wanted == value)
                }
                None => state_changed && trigger.value.map_or(true, |wanted| wanted == change.state),
            };
            if matched {
                return Some(change.at);
            }
        }
        None
    }
}

/// Latest known state and recent changes of every reported entity.
#[derive(Debug, Clone, Default)]
pub struct SensorRegistry {
    entities: HashMap<String, SensorHistory>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity_id: &str) -> Option<&SensorHistory> {
        self.entities.get(entity_id)
    }

    /// Ingest a state report. Returns true if a change was recorded.
    pub fn record(
        &mut self,
        entity_id: &str,
        state: &str,
        attributes: Map<String, Value>,
        at: NaiveDateTime,
    ) -> bool {
        match self.entities.get_mut(entity_id) {
            None => {
                let change = SensorChange {
                    state: state.to_string(),
                    attributes: attributes.clone(),
                    at,
                    state_changed: true,
                };
                self.entities.insert(
                    entity_id.to_string(),
                    SensorHistory {
                        state: state.to_string(),
                        attributes,
                        last_changed: at,
                        changes: VecDeque::from([change]),
                    },
                );
                true
            }
            Some(history) => {
                let state_changed = history.state != state;
                if !state_changed && history.attributes == attributes {
                    return false;
                }
                history.changes.push_back(SensorChange {
                    state: state.to_string(),
                    attributes: attributes.clone(),
                    at,
                    state_changed,
                });
                while history.changes.len() > MAX_SENSOR_HISTORY_CHANGES {
                    history.changes.pop_front();
                }
                if state_changed {
                    history.last_changed = at;
                }
                history.state = state.to_string();
                history.attributes = attributes;
                true
            }
        }
    }
}
