use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core_state::CoreState;
use crate::models::timestamp::deserialize_opt_timestamp;

#[derive(Debug, Clone, Deserialize)]
pub struct ReportedState {
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub last_changed: Option<NaiveDateTime>,
}

/// A `state_changed` payload, either flat or with a nested `new_state`.
#[derive(Debug, Clone, Deserialize)]
pub struct StateChangedEvent {
    pub entity_id: String,
    #[serde(default)]
    pub new_state: Option<ReportedState>,
    #[serde(flatten)]
    pub flat: Option<ReportedState>,
}

impl StateChangedEvent {
    fn into_report(self) -> Option<(String, ReportedState)> {
        let report = self.new_state.or(self.flat)?;
        Some((self.entity_id, report))
    }
}

/// Feed a sensor report into the registry. False when the payload is not a
/// usable report or nothing changed.
pub async fn handle_state_changed(state: &CoreState, payload: Value) -> bool {
    let event: StateChangedEvent = match serde_json::from_value(payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed state_changed payload");
            return false;
        }
    };
    let Some((entity_id, report)) = event.into_report() else {
        return false;
    };
    state
        .record_sensor_state(&entity_id, &report.state, report.attributes, report.last_changed)
        .await
}
