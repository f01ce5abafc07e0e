use serde_json::Value;

use super::medications::{ActionResponse, MedicationRequest};
use crate::core_state::CoreState;
use crate::notifications::is_notification_action_topic;

/// Send a test reminder for one medication right away.
pub async fn test_notification(state: &CoreState, request: MedicationRequest) -> ActionResponse {
    let sent = state.send_test_notification(&request.medication_id).await;
    ActionResponse {
        success: sent,
        medication_id: Some(request.medication_id),
        value: None,
        error: None,
    }
}

/// Handle an inbound notification-action event. The payload carries the
/// pressed button as `{"action": "<verb>_medication_<id>"}`.
pub async fn handle_action_event(state: &CoreState, topic: &str, payload: &Value) -> bool {
    if !is_notification_action_topic(topic) {
        return false;
    }
    match payload.get("action").and_then(Value::as_str) {
        Some(action) => state.handle_notification_action(action).await,
        None => {
            tracing::debug!(topic = %topic, "Notification action event without action field");
            false
        }
    }
}
