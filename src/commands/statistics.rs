use crate::core_state::CoreState;
use crate::statistics::{Statistics, StatisticsQuery};

/// Adherence statistics for a date range (default: the last 30 days).
pub async fn get_statistics(state: &CoreState, query: StatisticsQuery) -> Statistics {
    state.statistics(&query).await
}
