//! Medication commands — actions, quantity adjustments, registration and
//! the status board.

use serde::{Deserialize, Serialize};

use crate::core_state::CoreState;
use crate::models::timestamp::deserialize_opt_amount;
use crate::models::{MedicationConfig, MAX_SNOOZE_MINUTES};
use crate::scheduling::MedicationView;

#[derive(Debug, Clone, Deserialize)]
pub struct MedicationRequest {
    pub medication_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnoozeRequest {
    pub medication_id: String,
    /// Minutes; absent or non-positive uses the medication's default.
    #[serde(default, alias = "duration", deserialize_with = "deserialize_opt_amount")]
    pub snooze_duration: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    pub medication_id: Option<String>,
}

/// Outcome of a single-medication command. `success: false` with no error
/// means the medication id was unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medication_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    fn applied(medication_id: String, success: bool) -> Self {
        if !success {
            tracing::debug!(medication_id = %medication_id, "Unknown medication, nothing to do");
        }
        Self {
            success,
            medication_id: Some(medication_id),
            value: None,
            error: None,
        }
    }

    fn adjusted(medication_id: String, value: Option<f64>) -> Self {
        Self {
            value,
            ..Self::applied(medication_id, value.is_some())
        }
    }

    fn rejected(medication_id: Option<String>, error: String) -> Self {
        Self {
            success: false,
            medication_id,
            value: None,
            error: Some(error),
        }
    }
}

// ═══════════════════════════════════════════
// Actions
// ═══════════════════════════════════════════

pub async fn take_medication(state: &CoreState, request: MedicationRequest) -> ActionResponse {
    let success = state.take(&request.medication_id).await;
    ActionResponse::applied(request.medication_id, success)
}

pub async fn skip_medication(state: &CoreState, request: MedicationRequest) -> ActionResponse {
    let success = state.skip(&request.medication_id).await;
    ActionResponse::applied(request.medication_id, success)
}

pub async fn refill_medication(state: &CoreState, request: MedicationRequest) -> ActionResponse {
    let success = state.refill(&request.medication_id).await;
    ActionResponse::applied(request.medication_id, success)
}

pub async fn snooze_medication(state: &CoreState, request: SnoozeRequest) -> ActionResponse {
    let minutes = request
        .snooze_duration
        .filter(|m| m.is_finite())
        .map(|m| m.round().clamp(0.0, MAX_SNOOZE_MINUTES as f64) as i64);
    let success = state.snooze(&request.medication_id, minutes).await;
    ActionResponse::applied(request.medication_id, success)
}

// ═══════════════════════════════════════════
// Quantity adjustments
// ═══════════════════════════════════════════

pub async fn increment_dosage(state: &CoreState, request: MedicationRequest) -> ActionResponse {
    let value = state.increment_dosage(&request.medication_id).await;
    ActionResponse::adjusted(request.medication_id, value)
}

pub async fn decrement_dosage(state: &CoreState, request: MedicationRequest) -> ActionResponse {
    let value = state.decrement_dosage(&request.medication_id).await;
    ActionResponse::adjusted(request.medication_id, value)
}

pub async fn increment_remaining(state: &CoreState, request: MedicationRequest) -> ActionResponse {
    let value = state.increment_remaining(&request.medication_id).await;
    ActionResponse::adjusted(request.medication_id, value)
}

pub async fn decrement_remaining(state: &CoreState, request: MedicationRequest) -> ActionResponse {
    let value = state.decrement_remaining(&request.medication_id).await;
    ActionResponse::adjusted(request.medication_id, value)
}

// ═══════════════════════════════════════════
// Registration
// ═══════════════════════════════════════════

pub async fn register_medication(state: &CoreState, config: MedicationConfig) -> ActionResponse {
    match state.register_medication(config).await {
        Ok(id) => ActionResponse::applied(id, true),
        Err(e) => {
            tracing::warn!(error = %e, "Medication registration rejected");
            ActionResponse::rejected(None, e.to_string())
        }
    }
}

pub async fn update_medication(state: &CoreState, config: MedicationConfig) -> ActionResponse {
    let id = config.id.clone();
    match state.update_medication(config).await {
        Ok(updated) => ActionResponse::applied(id, updated),
        Err(e) => {
            tracing::warn!(medication_id = %id, error = %e, "Medication update rejected");
            ActionResponse::rejected(Some(id), e.to_string())
        }
    }
}

pub async fn remove_medication(state: &CoreState, request: MedicationRequest) -> ActionResponse {
    let success = state.remove_medication(&request.medication_id).await;
    ActionResponse::applied(request.medication_id, success)
}

/// One medication's view, or all of them sorted by name.
pub fn get_medication_status(state: &CoreState, request: StatusRequest) -> Vec<MedicationView> {
    match request.medication_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => state.medication_status(id).into_iter().collect(),
        None => state.medication_statuses(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::engine;
    use crate::models::{DoseStatus, Schedule};
    use serde_json::json;

    fn request(id: &str) -> MedicationRequest {
        MedicationRequest { medication_id: id.into() }
    }

    #[tokio::test]
    async fn unknown_medication_is_quiet_failure() {
        let (state, _) = engine().await;
        let response = take_medication(&state, request("ghost")).await;
        assert!(!response.success);
        assert!(response.error.is_none());
        assert!(state.snapshot().await.history.is_empty());
    }

    #[tokio::test]
    async fn dosage_floor_holds_at_half() {
        let (state, _) = engine().await;
        assert_eq!(decrement_dosage(&state, request("a")).await.value, Some(0.5));
        assert_eq!(decrement_dosage(&state, request("a")).await.value, Some(0.5));
        assert_eq!(increment_dosage(&state, request("a")).await.value, Some(1.0));
    }

    #[tokio::test]
    async fn remaining_adjusts_by_one_dosage() {
        let (state, _) = engine().await;
        assert_eq!(increment_remaining(&state, request("b")).await.value, Some(31.0));
        assert_eq!(decrement_remaining(&state, request("b")).await.value, Some(30.0));
        assert!(state.snapshot().await.history.is_empty());
    }

    #[tokio::test]
    async fn snooze_accepts_numeric_strings() {
        let (state, _) = engine().await;
        let request: SnoozeRequest =
            serde_json::from_value(json!({ "medication_id": "a", "snooze_duration": "45" })).unwrap();
        assert!(snooze_medication(&state, request).await.success);
        let doc = state.snapshot().await;
        assert_eq!(doc.history[0].snooze_minutes, Some(45));
    }

    #[tokio::test]
    async fn oversized_snooze_is_capped() {
        let (state, _) = engine().await;
        for duration in [json!(1e30), json!("1e300"), json!("inf"), json!(-1e30)] {
            let response = crate::commands::call_service(
                &state,
                "snooze_medication",
                json!({ "medication_id": "a", "snooze_duration": duration }),
            )
            .await
            .unwrap();
            assert_eq!(response["success"], true);
        }
        let doc = state.snapshot().await;
        let minutes: Vec<_> = doc.history.iter().map(|e| e.snooze_minutes).collect();
        assert_eq!(minutes, vec![Some(MAX_SNOOZE_MINUTES), Some(MAX_SNOOZE_MINUTES), Some(15), Some(15)]);
        assert_eq!(doc.medication("a").unwrap().state.snooze_until, Some(crate::commands::test_support::at(19, 12, 15)));
    }

    #[tokio::test]
    async fn refill_then_take_tracks_supply() {
        let (state, _) = engine().await;
        take_medication(&state, request("a")).await;
        take_medication(&state, request("a")).await;
        assert!(refill_medication(&state, request("a")).await.success);
        let doc = state.snapshot().await;
        assert_eq!(doc.medication("a").unwrap().state.remaining_amount, 30.0);
        assert_eq!(doc.history[2].amount, Some(30.0));
    }

    #[tokio::test]
    async fn registration_reports_validation_errors() {
        let (state, _) = engine().await;
        let config = MedicationConfig::new("", Schedule::default());
        let response = register_medication(&state, config).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("name"));

        let config = MedicationConfig::new("Vitamin D", Schedule::default());
        let response = register_medication(&state, config).await;
        assert!(response.success);
        assert_eq!(state.medication_statuses().len(), 3);
    }

    #[tokio::test]
    async fn status_lists_board_sorted_by_name() {
        let (state, _) = engine().await;
        let all = get_medication_status(&state, StatusRequest::default());
        let names: Vec<&str> = all.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);

        let one = get_medication_status(&state, StatusRequest { medication_id: Some("b".into()) });
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].status, DoseStatus::Scheduled);
        assert_eq!(one[0].taken_scheduled_ratio.as_deref(), Some("0/2"));
    }
}
