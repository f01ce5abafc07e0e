//! Engine state — the one shared document plus everything derived from it.
//!
//! `CoreState` is constructed once at startup and shared behind an `Arc` by
//! the periodic tick, event subscriptions and service callers. All document
//! mutations go through `DocumentStore::mutate`; sensor reports and the
//! status board live in `RwLock`s that are never held across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{Duration, Local, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::activity_log::{ActivityRecord, ActivitySink, CsvActivityLog, NullActivityLog};
use crate::config::{ConfigError, EngineConfig};
use crate::db::{Change, DocumentStore, JsonFileBackend, MedicationRecord, SharedDocument, StoreError};
use crate::history::{self, HistoryMutation, HistoryPage, HistoryQuery};
use crate::medications;
use crate::models::{normalize_dosage_unit, ActionVerb, HistoryUpdate, MedicationConfig};
use crate::notifications::{self, build_reminder, claim_occurrence, Notification, NotificationDispatcher, Notifier};
use crate::scheduling::{evaluate_medication, DocumentReferences, MedicationView, SensorRegistry};
use crate::statistics::{self, Statistics, StatisticsQuery};

// ═══════════════════════════════════════════════════════════
// Clock
// ═══════════════════════════════════════════════════════════

/// Source of "now" as local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to. Used for replays and tests.
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, at: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

/// Outcome of one resolver → evaluator → dispatcher pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshSummary {
    pub evaluated: usize,
    pub notifications_sent: usize,
}

pub struct CoreState {
    store: DocumentStore,
    sensors: RwLock<SensorRegistry>,
    board: RwLock<HashMap<String, MedicationView>>,
    dispatcher: NotificationDispatcher,
    activity: Arc<dyn ActivitySink>,
    clock: Arc<dyn Clock>,
}

impl CoreState {
    pub fn new(
        store: DocumentStore,
        notifier: Arc<dyn Notifier>,
        activity: Arc<dyn ActivitySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            sensors: RwLock::new(SensorRegistry::new()),
            board: RwLock::new(HashMap::new()),
            dispatcher: NotificationDispatcher::new(notifier),
            activity,
            clock,
        }
    }

    /// Open the file-backed document described by `config`.
    pub async fn open(config: &EngineConfig, notifier: Arc<dyn Notifier>) -> Result<Self, CoreError> {
        let backend = Arc::new(JsonFileBackend::new(config.document_path()));
        let store = DocumentStore::open(backend).await?;
        let activity: Arc<dyn ActivitySink> = if config.activity_log_enabled {
            Arc::new(CsvActivityLog::new(config.logs_dir()))
        } else {
            Arc::new(NullActivityLog)
        };
        tracing::info!(
            document = %config.document_path().display(),
            activity_log = config.activity_log_enabled,
            "Engine state opened"
        );
        Ok(Self::new(store, notifier, activity, Arc::new(SystemClock)))
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Copy of the current document.
    pub async fn snapshot(&self) -> SharedDocument {
        self.store.snapshot().await
    }

    // ── Medication registration ─────────────────────────────

    /// Insert a medication, generating an id when none is given. An existing
    /// id keeps its runtime state and only the configuration is replaced.
    pub async fn register_medication(&self, mut config: MedicationConfig) -> Result<String, CoreError> {
        if config.id.trim().is_empty() {
            config.id = Uuid::new_v4().to_string();
        }
        config.migrate_legacy_unit();
        config.dosage_unit = normalize_dosage_unit(Some(config.dosage_unit.as_str()));
        config.validate().map_err(CoreError::InvalidConfig)?;

        let id = config.id.clone();
        self.store
            .mutate(|doc| {
                match doc.medications.get_mut(&id) {
                    Some(existing) => existing.config = config,
                    None => {
                        doc.medications.insert(id.clone(), MedicationRecord::new(config));
                    }
                }
                Change::Modified(())
            })
            .await;
        tracing::info!(medication_id = %id, "Medication registered");
        self.refresh().await;
        Ok(id)
    }

    /// Replace the configuration of a known medication. `Ok(false)` when the
    /// id is unknown.
    pub async fn update_medication(&self, mut config: MedicationConfig) -> Result<bool, CoreError> {
        config.migrate_legacy_unit();
        config.dosage_unit = normalize_dosage_unit(Some(config.dosage_unit.as_str()));
        config.validate().map_err(CoreError::InvalidConfig)?;

        let id = config.id.clone();
        let updated = self
            .store
            .mutate(|doc| match doc.medications.get_mut(&id) {
                Some(existing) => {
                    existing.config = config;
                    Change::Modified(true)
                }
                None => Change::Unchanged(false),
            })
            .await;
        if updated {
            tracing::info!(medication_id = %id, "Medication updated");
            self.refresh().await;
        }
        Ok(updated)
    }

    /// Drop a medication. Its history stays.
    pub async fn remove_medication(&self, id: &str) -> bool {
        let removed = self
            .store
            .mutate(|doc| match doc.medications.remove(id) {
                Some(_) => {
                    self.board.write().unwrap_or_else(PoisonError::into_inner).remove(id);
                    Change::Modified(true)
                }
                None => Change::Unchanged(false),
            })
            .await;
        if removed {
            tracing::info!(medication_id = %id, "Medication removed");
            self.refresh().await;
        }
        removed
    }

    // ── Actions ─────────────────────────────────────────────

    pub async fn take(&self, id: &str) -> bool {
        self.apply_logged(|doc, now| medications::take_medication(doc, id, now)).await
    }

    pub async fn skip(&self, id: &str) -> bool {
        self.apply_logged(|doc, now| medications::skip_medication(doc, id, now)).await
    }

    pub async fn refill(&self, id: &str) -> bool {
        self.apply_logged(|doc, now| medications::refill_medication(doc, id, now)).await
    }

    pub async fn snooze(&self, id: &str, duration_minutes: Option<i64>) -> bool {
        self.apply_logged(|doc, now| medications::snooze_medication(doc, id, duration_minutes, now))
            .await
    }

    pub async fn increment_dosage(&self, id: &str) -> Option<f64> {
        self.apply_adjustment(|doc| medications::increment_dosage(doc, id)).await
    }

    pub async fn decrement_dosage(&self, id: &str) -> Option<f64> {
        self.apply_adjustment(|doc| medications::decrement_dosage(doc, id)).await
    }

    pub async fn increment_remaining(&self, id: &str) -> Option<f64> {
        self.apply_adjustment(|doc| medications::increment_remaining(doc, id)).await
    }

    pub async fn decrement_remaining(&self, id: &str) -> Option<f64> {
        self.apply_adjustment(|doc| medications::decrement_remaining(doc, id)).await
    }

    /// Run a history-producing action, log it, then recompute dependents.
    async fn apply_logged(
        &self,
        action: impl FnOnce(&mut SharedDocument, NaiveDateTime) -> Option<ActivityRecord>,
    ) -> bool {
        let now = self.clock.now();
        let row = self
            .store
            .mutate(|doc| match action(doc, now) {
                Some(row) => Change::Modified(Some(row)),
                None => Change::Unchanged(None),
            })
            .await;
        match row {
            Some(row) => {
                let sink = Arc::clone(&self.activity);
                if let Err(e) = tokio::task::spawn_blocking(move || sink.record(&row)).await {
                    tracing::warn!(error = %e, "Activity log write failed");
                }
                self.refresh().await;
                true
            }
            None => false,
        }
    }

    async fn apply_adjustment(&self, adjust: impl FnOnce(&mut SharedDocument) -> Option<f64>) -> Option<f64> {
        let value = self
            .store
            .mutate(|doc| match adjust(doc) {
                Some(v) => Change::Modified(Some(v)),
                None => Change::Unchanged(None),
            })
            .await;
        if value.is_some() {
            self.refresh().await;
        }
        value
    }

    // ── History & statistics ────────────────────────────────

    pub async fn history(&self, query: &HistoryQuery) -> HistoryPage {
        self.store.read(|doc| history::query_history(doc, query)).await
    }

    pub async fn edit_history(&self, index: usize, update: &HistoryUpdate) -> HistoryMutation {
        let result = self
            .store
            .mutate(|doc| {
                let result = history::edit_history(doc, index, update);
                if result.success && !update.is_empty() {
                    Change::Modified(result)
                } else {
                    Change::Unchanged(result)
                }
            })
            .await;
        if result.success {
            self.refresh().await;
        }
        result
    }

    pub async fn delete_history(&self, index: usize) -> HistoryMutation {
        let result = self
            .store
            .mutate(|doc| {
                let result = history::delete_history(doc, index);
                if result.success {
                    Change::Modified(result)
                } else {
                    Change::Unchanged(result)
                }
            })
            .await;
        if result.success {
            self.refresh().await;
        }
        result
    }

    pub async fn statistics(&self, query: &StatisticsQuery) -> Statistics {
        let now = self.clock.now();
        self.store
            .read(|doc| statistics::aggregate(&doc.history, &doc.medications, query, now))
            .await
    }

    // ── External events ─────────────────────────────────────

    /// Ingest a sensor report and recompute when it changed anything.
    pub async fn record_sensor_state(
        &self,
        entity_id: &str,
        state: &str,
        attributes: Map<String, Value>,
        at: Option<NaiveDateTime>,
    ) -> bool {
        let at = at.unwrap_or_else(|| self.clock.now());
        let changed = self
            .sensors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .record(entity_id, state, attributes, at);
        if changed {
            tracing::debug!(entity_id = %entity_id, state = %state, "Sensor change recorded");
            self.refresh().await;
        }
        changed
    }

    /// Apply an action identifier from a notification button. Unknown verbs
    /// and unknown medications are ignored.
    pub async fn handle_notification_action(&self, action: &str) -> bool {
        let Some((verb, id)) = notifications::parse_action(action) else {
            tracing::debug!(action = %action, "Ignoring unrecognised notification action");
            return false;
        };
        match verb {
            ActionVerb::Take => self.take(id).await,
            ActionVerb::Skip => self.skip(id).await,
            ActionVerb::Snooze => self.snooze(id, None).await,
        }
    }

    /// Send a reminder now without touching notification dedup state.
    pub async fn send_test_notification(&self, id: &str) -> bool {
        let pending = self
            .store
            .read(|doc| {
                doc.medication(id)
                    .map(|r| (r.config.notify_targets.clone(), build_reminder(&r.config, true)))
            })
            .await;
        match pending {
            Some((targets, notification)) => self.dispatcher.dispatch(&targets, &notification) > 0,
            None => false,
        }
    }

    // ── Status board ────────────────────────────────────────

    /// Last computed view of one medication.
    pub fn medication_status(&self, id: &str) -> Option<MedicationView> {
        self.board
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn medication_statuses(&self) -> Vec<MedicationView> {
        let board = self.board.read().unwrap_or_else(PoisonError::into_inner);
        let mut views: Vec<MedicationView> = board.values().cloned().collect();
        views.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.medication_id.cmp(&b.medication_id)));
        views
    }

    // ── Tick ────────────────────────────────────────────────

    /// Re-evaluate every medication, persist derived state (expired
    /// snoozes, missed doses, notified occurrences) and send due reminders.
    ///
    /// The board is replaced while the document lock is held, so it always
    /// reflects the latest evaluated document.
    pub async fn refresh(&self) -> RefreshSummary {
        let now = self.clock.now();
        let (evaluated, pending) = self
            .store
            .mutate(|doc| {
                let views: Vec<MedicationView> = {
                    let sensors = self.sensors.read().unwrap_or_else(PoisonError::into_inner);
                    let refs = DocumentReferences { document: doc, sensors: &sensors };
                    doc.medications
                        .values()
                        .map(|record| evaluate_medication(record, &refs, now))
                        .collect()
                };

                let mut changed = false;
                let mut pending: Vec<(Vec<String>, Notification)> = Vec::new();
                for view in &views {
                    let Some(record) = doc.medications.get_mut(&view.medication_id) else {
                        continue;
                    };
                    if view.snooze_expired {
                        record.state.snooze_until = None;
                        changed = true;
                    }
                    if record.state.missed_doses != view.missed_doses {
                        record.state.missed_doses = view.missed_doses.clone();
                        changed = true;
                    }
                    if view.status == crate::models::DoseStatus::Due && record.config.enable_automatic_notifications {
                        if let Some(occurrence) = view.next_dose {
                            if claim_occurrence(&mut record.state, occurrence) {
                                pending.push((record.config.notify_targets.clone(), build_reminder(&record.config, false)));
                                changed = true;
                            }
                        }
                    }
                }
                let evaluated = views.len();
                *self.board.write().unwrap_or_else(PoisonError::into_inner) = views
                    .into_iter()
                    .map(|view| (view.medication_id.clone(), view))
                    .collect();
                let outcome = (evaluated, pending);
                if changed {
                    Change::Modified(outcome)
                } else {
                    Change::Unchanged(outcome)
                }
            })
            .await;

        let mut notifications_sent = 0;
        for (targets, notification) in &pending {
            if self.dispatcher.dispatch(targets, notification) > 0 {
                notifications_sent += 1;
            }
        }

        tracing::debug!(evaluated, notifications_sent, "Refresh complete");
        RefreshSummary {
            evaluated,
            notifications_sent,
        }
    }

    /// Retry a pending persist.
    pub async fn flush(&self) -> Result<(), CoreError> {
        Ok(self.store.flush().await?)
    }

    /// Clear the document, sensors and status board.
    pub async fn reset(&self) -> Result<(), CoreError> {
        self.store.reset().await?;
        *self.sensors.write().unwrap_or_else(PoisonError::into_inner) = SensorRegistry::new();
        self.board.write().unwrap_or_else(PoisonError::into_inner).clear();
        tracing::info!("Engine state reset");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Error types
// ═══════════════════════════════════════════════════════════

/// Errors from CoreState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid medication configuration: {0}")]
    InvalidConfig(String),
    #[error("Runtime error: {0}")]
    Runtime(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryBackend;
    use crate::models::{
        DoseStatus, FixedTimeSchedule, HistoryAction, RelativeMedicationSchedule, RelativeSensorSchedule, Schedule,
        ALL_DAYS,
    };
    use crate::notifications::testing::RecordingNotifier;
    use chrono::NaiveDate;

    // 2026-10-19 is a Monday.
    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn all_days() -> Vec<String> {
        ALL_DAYS.iter().map(|d| d.to_string()).collect()
    }

    struct Harness {
        state: CoreState,
        clock: Arc<ManualClock>,
        notifier: Arc<RecordingNotifier>,
        backend: Arc<MemoryBackend>,
    }

    async fn harness(start: NaiveDateTime) -> Harness {
        let backend = Arc::new(MemoryBackend::new());
        let store = DocumentStore::open(backend.clone()).await.unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let notifier = Arc::new(RecordingNotifier::default());
        let state = CoreState::new(store, notifier.clone(), Arc::new(NullActivityLog), clock.clone());
        Harness { state, clock, notifier, backend }
    }

    fn twice_daily(id: &str) -> MedicationConfig {
        let mut config = MedicationConfig::new(id.to_uppercase(), Schedule::FixedTime(FixedTimeSchedule {
            times: vec!["08:00".into(), "20:00".into()],
            days: all_days(),
        }));
        config.id = id.into();
        config.refill_amount = 30.0;
        config
    }

    #[tokio::test]
    async fn take_scenario_updates_supply_and_history() {
        let h = harness(at(19, 8, 5)).await;
        h.state.register_medication(twice_daily("a")).await.unwrap();

        assert!(h.state.take("a").await);
        let doc = h.state.snapshot().await;
        let record = doc.medication("a").unwrap();
        assert_eq!(record.state.remaining_amount, 29.0);
        assert_eq!(record.state.last_taken, Some(at(19, 8, 5)));
        assert_eq!(doc.history.len(), 1);
        assert_eq!(doc.history[0].action, HistoryAction::Taken);

        let persisted = h.backend.saved_document().unwrap();
        assert_eq!(persisted.medication("a").unwrap().state.remaining_amount, 29.0);
        assert_eq!(h.state.medication_status("a").unwrap().status, DoseStatus::Taken);
    }

    #[tokio::test]
    async fn unknown_ids_are_silent_no_ops() {
        let h = harness(at(19, 8, 5)).await;
        assert!(!h.state.take("ghost").await);
        assert!(!h.state.snooze("ghost", Some(10)).await);
        assert_eq!(h.state.increment_dosage("ghost").await, None);
        assert!(h.state.snapshot().await.history.is_empty());
        assert_eq!(h.backend.save_count(), 0);
    }

    #[tokio::test]
    async fn registration_generates_ids_and_rejects_invalid() {
        let h = harness(at(19, 8, 5)).await;
        let mut config = twice_daily("");
        config.name = "Generated".into();
        let id = h.state.register_medication(config).await.unwrap();
        assert!(Uuid::parse_str(&id).is_ok());

        let mut bad = twice_daily("bad");
        bad.schedule = Schedule::FixedTime(FixedTimeSchedule { times: vec!["8am".into()], days: all_days() });
        assert!(matches!(h.state.register_medication(bad).await, Err(CoreError::InvalidConfig(_))));
        assert!(h.state.snapshot().await.medication("bad").is_none());
    }

    #[tokio::test]
    async fn update_keeps_runtime_state() {
        let h = harness(at(19, 8, 5)).await;
        h.state.register_medication(twice_daily("a")).await.unwrap();
        h.state.take("a").await;

        let mut changed = twice_daily("a");
        changed.dosage = 2.0;
        assert!(h.state.update_medication(changed).await.unwrap());
        let doc = h.state.snapshot().await;
        assert_eq!(doc.medication("a").unwrap().config.dosage, 2.0);
        assert_eq!(doc.medication("a").unwrap().state.remaining_amount, 29.0);

        assert!(!h.state.update_medication(twice_daily("missing")).await.unwrap());
        assert!(h.state.remove_medication("a").await);
        assert!(h.state.medication_status("a").is_none());
        assert_eq!(h.state.snapshot().await.history.len(), 1);
    }

    #[tokio::test]
    async fn due_occurrence_notifies_exactly_once() {
        let h = harness(at(19, 7, 45)).await;
        let mut config = twice_daily("a");
        config.notify_targets = vec!["notify.phone".into()];
        h.state.register_medication(config).await.unwrap();
        assert_eq!(h.notifier.sent().len(), 1);

        let again = h.state.refresh().await;
        assert_eq!(again.notifications_sent, 0);
        h.clock.advance(Duration::minutes(5));
        h.state.refresh().await;
        assert_eq!(h.notifier.sent().len(), 1);

        let (target, notification) = &h.notifier.sent()[0];
        assert_eq!(target, "notify.phone");
        assert_eq!(notification.actions[0].action, "take_medication_a");
        let doc = h.state.snapshot().await;
        assert_eq!(doc.medication("a").unwrap().state.last_notified_occurrence, Some(at(19, 8, 0)));

        // Next occurrence notifies again.
        h.clock.set(at(19, 19, 40));
        h.state.refresh().await;
        assert_eq!(h.notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn automatic_notifications_can_be_disabled() {
        let h = harness(at(19, 7, 45)).await;
        let mut config = twice_daily("a");
        config.enable_automatic_notifications = false;
        h.state.register_medication(config).await.unwrap();
        assert_eq!(h.state.medication_status("a").unwrap().status, DoseStatus::Due);
        assert!(h.notifier.sent().is_empty());

        assert!(h.state.send_test_notification("a").await);
        let sent = h.notifier.sent();
        assert_eq!(sent[0].0, "persistent_notification");
        assert_eq!(sent[0].1.title, "Medication Reminder (Test)");
        assert!(h.state.snapshot().await.medication("a").unwrap().state.last_notified_occurrence.is_none());
    }

    #[tokio::test]
    async fn snooze_suppresses_then_expires_and_clears() {
        let h = harness(at(19, 8, 10)).await;
        h.state.register_medication(twice_daily("a")).await.unwrap();
        h.clock.set(at(19, 8, 40));
        h.state.refresh().await;
        assert_eq!(h.state.medication_status("a").unwrap().status, DoseStatus::Scheduled);

        h.clock.set(at(19, 19, 35));
        assert!(h.state.snooze("a", Some(20)).await);
        let view = h.state.medication_status("a").unwrap();
        assert_eq!(view.status, DoseStatus::Scheduled);
        assert!(view.snoozed);

        h.clock.set(at(19, 19, 56));
        h.state.refresh().await;
        let doc = h.state.snapshot().await;
        assert!(doc.medication("a").unwrap().state.snooze_until.is_none());
        assert_eq!(h.state.medication_status("a").unwrap().status, DoseStatus::Due);
    }

    #[tokio::test]
    async fn missed_doses_are_persisted_by_refresh() {
        let h = harness(at(19, 7, 0)).await;
        h.state.register_medication(twice_daily("a")).await.unwrap();
        h.clock.set(at(19, 9, 0));
        h.state.refresh().await;
        let doc = h.state.snapshot().await;
        assert_eq!(doc.medication("a").unwrap().state.missed_doses, vec![at(18, 20, 0), at(19, 8, 0)]);

        h.state.take("a").await;
        let doc = h.state.snapshot().await;
        assert!(doc.medication("a").unwrap().state.missed_doses.is_empty());
    }

    #[tokio::test]
    async fn taking_reference_reschedules_dependent() {
        let h = harness(at(19, 8, 0)).await;
        h.state.register_medication(twice_daily("base")).await.unwrap();
        let mut dependent = MedicationConfig::new("Dependent", Schedule::RelativeMedication(RelativeMedicationSchedule {
            reference_medication_id: "base".into(),
            offset_hours: 2,
            offset_minutes: 0,
            days: all_days(),
        }));
        dependent.id = "dep".into();
        dependent.refill_amount = 30.0;
        h.state.register_medication(dependent).await.unwrap();
        assert_eq!(h.state.medication_status("dep").unwrap().next_dose, None);

        h.state.take("base").await;
        assert_eq!(h.state.medication_status("dep").unwrap().next_dose, Some(at(19, 10, 0)));
    }

    #[tokio::test]
    async fn sensor_event_schedules_dose() {
        let h = harness(at(19, 7, 0)).await;
        let mut config = MedicationConfig::new("Probiotic", Schedule::RelativeSensor(RelativeSensorSchedule {
            reference_entity_id: "binary_sensor.fridge".into(),
            offset_hours: 0,
            offset_minutes: 15,
            days: all_days(),
            trigger_value: Some("on".into()),
            trigger_attribute: None,
            avoid_duplicate_triggers: true,
            ignore_unavailable: true,
        }));
        config.id = "pro".into();
        config.refill_amount = 30.0;
        h.state.register_medication(config).await.unwrap();

        assert!(h.state.record_sensor_state("binary_sensor.fridge", "on", Map::new(), None).await);
        assert!(!h.state.record_sensor_state("binary_sensor.fridge", "on", Map::new(), None).await);
        let view = h.state.medication_status("pro").unwrap();
        assert_eq!(view.next_dose, Some(at(19, 7, 15)));
        assert_eq!(view.status, DoseStatus::Due);

        h.state.take("pro").await;
        assert_eq!(h.state.medication_status("pro").unwrap().next_dose, None);
    }

    #[tokio::test]
    async fn notification_actions_route_to_processor() {
        let h = harness(at(19, 8, 0)).await;
        h.state.register_medication(twice_daily("a")).await.unwrap();
        assert!(h.state.handle_notification_action("take_medication_a").await);
        assert!(h.state.handle_notification_action("snooze_medication_a").await);
        assert!(h.state.handle_notification_action("skip_medication_a").await);
        assert!(!h.state.handle_notification_action("take_medication_zzz").await);
        assert!(!h.state.handle_notification_action("wave_medication_a").await);

        let actions: Vec<HistoryAction> = h.state.snapshot().await.history.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![HistoryAction::Taken, HistoryAction::Snoozed, HistoryAction::Skipped]);
    }

    #[tokio::test]
    async fn concurrent_takes_on_two_medications_lose_nothing() {
        let h = harness(at(19, 8, 0)).await;
        h.state.register_medication(twice_daily("a")).await.unwrap();
        h.state.register_medication(twice_daily("b")).await.unwrap();
        let state = Arc::new(h.state);

        let mut tasks = Vec::new();
        for id in ["a", "b", "a", "b"] {
            let state = Arc::clone(&state);
            tasks.push(tokio::spawn(async move { state.take(id).await }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }
        let doc = state.snapshot().await;
        assert_eq!(doc.history.len(), 4);
        assert_eq!(doc.medication("a").unwrap().state.remaining_amount, 28.0);
        assert_eq!(doc.medication("b").unwrap().state.remaining_amount, 28.0);
    }

    #[tokio::test]
    async fn history_edit_out_of_range_is_structured_failure() {
        let h = harness(at(19, 8, 0)).await;
        h.state.register_medication(twice_daily("a")).await.unwrap();
        h.state.take("a").await;
        let saves = h.backend.save_count();

        let result = h.state.edit_history(99999, &HistoryUpdate::default()).await;
        assert!(!result.success);
        assert!(result.error.is_some());
        assert_eq!(h.backend.save_count(), saves);
        assert_eq!(h.state.snapshot().await.history.len(), 1);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let h = harness(at(19, 8, 0)).await;
        h.state.register_medication(twice_daily("a")).await.unwrap();
        h.state.take("a").await;
        h.state.reset().await.unwrap();
        assert_eq!(h.state.snapshot().await, SharedDocument::default());
        assert!(h.state.medication_statuses().is_empty());
    }

    #[derive(Default)]
    struct ThreadRecordingLog {
        rows: Mutex<Vec<(String, std::thread::ThreadId)>>,
    }

    impl ActivitySink for ThreadRecordingLog {
        fn record(&self, entry: &ActivityRecord) {
            self.rows
                .lock()
                .unwrap()
                .push((entry.medication_id.clone(), std::thread::current().id()));
        }
    }

    #[tokio::test]
    async fn activity_rows_are_written_off_the_runtime_thread() {
        let store = DocumentStore::open(Arc::new(MemoryBackend::new())).await.unwrap();
        let log = Arc::new(ThreadRecordingLog::default());
        let clock = Arc::new(ManualClock::new(at(19, 8, 0)));
        let state = CoreState::new(store, Arc::new(RecordingNotifier::default()), log.clone(), clock);
        state.register_medication(twice_daily("a")).await.unwrap();

        assert!(state.take("a").await);
        assert!(!state.take("ghost").await);

        let rows = log.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "a");
        assert_ne!(rows[0].1, std::thread::current().id());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn board_matches_document_after_concurrent_refreshes() {
        let h = harness(at(19, 8, 0)).await;
        h.state.register_medication(twice_daily("a")).await.unwrap();
        let state = Arc::new(h.state);

        for round in 1..=10 {
            let mut tasks = Vec::new();
            for _ in 0..4 {
                let state = Arc::clone(&state);
                tasks.push(tokio::spawn(async move {
                    state.refresh().await;
                }));
            }
            assert!(state.take("a").await);
            for task in tasks {
                task.await.unwrap();
            }
            let expected = 30.0 - f64::from(round);
            assert_eq!(state.snapshot().await.medication("a").unwrap().state.remaining_amount, expected);
            assert_eq!(state.medication_status("a").unwrap().remaining_amount, expected);
        }
    }

    #[tokio::test]
    async fn stored_out_of_range_offset_evaluates_without_scheduling() {
        let h = harness(at(19, 8, 0)).await;
        h.state.register_medication(twice_daily("a")).await.unwrap();
        let mut dependent = MedicationConfig::new("Dep", Schedule::RelativeMedication(RelativeMedicationSchedule {
            reference_medication_id: "a".into(),
            offset_hours: 1,
            offset_minutes: 0,
            days: all_days(),
        }));
        dependent.id = "dep".into();
        h.state.register_medication(dependent).await.unwrap();
        h.state
            .store
            .mutate(|doc| {
                if let Some(Schedule::RelativeMedication(s)) =
                    doc.medications.get_mut("dep").map(|r| &mut r.config.schedule)
                {
                    s.offset_hours = i64::MAX / 60;
                    s.offset_minutes = 59;
                }
                Change::Modified(())
            })
            .await;

        assert!(h.state.take("a").await);
        assert_eq!(h.state.medication_status("dep").unwrap().next_dose, None);
    }
}
