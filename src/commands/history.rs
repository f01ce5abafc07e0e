use serde::Deserialize;

use crate::core_state::CoreState;
use crate::history::{HistoryMutation, HistoryPage, HistoryQuery};
use crate::models::HistoryUpdate;

#[derive(Debug, Clone, Deserialize)]
pub struct EditHistoryRequest {
    pub history_index: usize,
    #[serde(flatten)]
    pub update: HistoryUpdate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteHistoryRequest {
    pub history_index: usize,
}

/// History entries tagged with their index, optionally filtered.
pub async fn get_medication_history(state: &CoreState, query: HistoryQuery) -> HistoryPage {
    state.history(&query).await
}

/// Indices shift after a delete; callers re-fetch before editing again.
pub async fn edit_medication_history(state: &CoreState, request: EditHistoryRequest) -> HistoryMutation {
    let result = state.edit_history(request.history_index, &request.update).await;
    if let Some(error) = &result.error {
        tracing::warn!(history_index = request.history_index, error = %error, "History edit failed");
    }
    result
}

pub async fn delete_medication_history(state: &CoreState, request: DeleteHistoryRequest) -> HistoryMutation {
    let result = state.delete_history(request.history_index).await;
    if let Some(error) = &result.error {
        tracing::warn!(history_index = request.history_index, error = %error, "History delete failed");
    }
    result
}
