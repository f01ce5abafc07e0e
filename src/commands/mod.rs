//! Service surface — request/response operations for remote callers.
//!
//! Every command takes the shared `CoreState` plus a typed request and
//! never fails outward: unknown ids are silent no-ops, history edits report
//! `{success: false, error}`. `call_service` routes JSON service calls by
//! name for transports that only carry untyped payloads.

pub mod history;
pub mod medications;
pub mod notifications;
pub mod sensors;
pub mod statistics;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::core_state::CoreState;

/// Health check — verifies the engine is running
pub fn health_check() -> String {
    tracing::debug!("Health check called");
    "ok".to_string()
}

fn parse_request<T: DeserializeOwned>(service: &str, data: Value) -> Result<T, String> {
    serde_json::from_value(data).map_err(|e| {
        tracing::warn!(service = %service, error = %e, "Rejected malformed service data");
        format!("Invalid data for {service}: {e}")
    })
}

fn to_response<T: Serialize>(service: &str, value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(service = %service, error = %e, "Failed to serialise service response");
            None
        }
    }
}

fn failure(error: String) -> Option<Value> {
    Some(json!({ "success": false, "error": error }))
}

/// Dispatch a named service call. `None` means the call produced no
/// response (unknown service or malformed data on a no-op service).
pub async fn call_service(state: &CoreState, service: &str, data: Value) -> Option<Value> {
    tracing::debug!(service = %service, "Service call");
    match service {
        "take_medication" | "skip_medication" | "refill_medication" | "increment_dosage"
        | "decrement_dosage" | "increment_remaining" | "decrement_remaining"
        | "remove_medication" | "test_notification" => {
            let request = parse_request(service, data).ok()?;
            let response = match service {
                "take_medication" => medications::take_medication(state, request).await,
                "skip_medication" => medications::skip_medication(state, request).await,
                "refill_medication" => medications::refill_medication(state, request).await,
                "increment_dosage" => medications::increment_dosage(state, request).await,
                "decrement_dosage" => medications::decrement_dosage(state, request).await,
                "increment_remaining" => medications::increment_remaining(state, request).await,
                "decrement_remaining" => medications::decrement_remaining(state, request).await,
                "remove_medication" => medications::remove_medication(state, request).await,
                _ => notifications::test_notification(state, request).await,
            };
            to_response(service, &response)
        }
        "snooze_medication" => {
            let request = parse_request(service, data).ok()?;
            to_response(service, &medications::snooze_medication(state, request).await)
        }
        "register_medication" => match parse_request(service, data) {
            Ok(config) => to_response(service, &medications::register_medication(state, config).await),
            Err(e) => failure(e),
        },
        "update_medication" => match parse_request(service, data) {
            Ok(config) => to_response(service, &medications::update_medication(state, config).await),
            Err(e) => failure(e),
        },
        "get_medication_status" => {
            let request = parse_request(service, data).ok()?;
            to_response(service, &medications::get_medication_status(state, request))
        }
        "get_medication_history" => {
            let query = parse_request(service, data).ok()?;
            to_response(service, &history::get_medication_history(state, query).await)
        }
        "edit_medication_history" => match parse_request(service, data) {
            Ok(request) => to_response(service, &history::edit_medication_history(state, request).await),
            Err(e) => failure(e),
        },
        "delete_medication_history" => match parse_request(service, data) {
            Ok(request) => to_response(service, &history::delete_medication_history(state, request).await),
            Err(e) => failure(e),
        },
        "get_statistics" => {
            let query = parse_request(service, data).ok()?;
            to_response(service, &statistics::get_statistics(state, query).await)
        }
        "health_check" => Some(Value::String(health_check())),
        _ => {
            tracing::warn!(service = %service, "Unknown service");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveDateTime};

    use crate::activity_log::NullActivityLog;
    use crate::core_state::{CoreState, ManualClock};
    use crate::db::{DocumentStore, MemoryBackend};
    use crate::models::{FixedTimeSchedule, MedicationConfig, Schedule, ALL_DAYS};
    use crate::notifications::testing::RecordingNotifier;

    pub fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    /// Engine at 2026-10-19 12:00 with medications "a" and "b" (08:00 and
    /// 20:00 daily, 30 in stock).
    pub async fn engine() -> (CoreState, Arc<RecordingNotifier>) {
        let store = DocumentStore::open(Arc::new(MemoryBackend::new())).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new(at(19, 12, 0)));
        let state = CoreState::new(store, notifier.clone(), Arc::new(NullActivityLog), clock);
        for id in ["a", "b"] {
            let mut config = MedicationConfig::new(id.to_uppercase(), Schedule::FixedTime(FixedTimeSchedule {
                times: vec!["08:00".into(), "20:00".into()],
                days: ALL_DAYS.iter().map(|d| d.to_string()).collect(),
            }));
            config.id = id.into();
            config.refill_amount = 30.0;
            state.register_medication(config).await.unwrap();
        }
        (state, notifier)
    }
}
