use std::sync::Arc;

use chrono::NaiveDateTime;

use super::actions::action_id;
use super::{Notification, NotificationAction, Notifier};
use crate::models::{dosage_display, ActionVerb, MedicationConfig, RuntimeState};

/// Target used when a medication lists no notify targets.
pub const FALLBACK_TARGET: &str = "persistent_notification";
pub const REMINDER_TITLE: &str = "Medication Reminder";

pub fn notification_tag(medication_id: &str) -> String {
    format!("dosekeeper_{medication_id}")
}

/// Reminder with take / snooze / skip buttons.
pub fn build_reminder(config: &MedicationConfig, is_test: bool) -> Notification {
    let title = if is_test {
        format!("{REMINDER_TITLE} (Test)")
    } else {
        REMINDER_TITLE.to_string()
    };
    let actions = [
        (ActionVerb::Take, "Mark as Taken"),
        (ActionVerb::Snooze, "Snooze"),
        (ActionVerb::Skip, "Skip"),
    ]
    .into_iter()
    .map(|(verb, label)| NotificationAction {
        action: action_id(verb, &config.id),
        title: label.to_string(),
    })
    .collect();

    Notification {
        title,
        message: format!("Time to take {} of {}", dosage_display(config), config.name),
        tag: notification_tag(&config.id),
        actions,
    }
}

/// Record `occurrence` as notified. False when it already was, so one
/// scheduled occurrence produces at most one reminder.
pub fn claim_occurrence(state: &mut RuntimeState, occurrence: NaiveDateTime) -> bool {
    if state.last_notified_occurrence == Some(occurrence) {
        return false;
    }
    state.last_notified_occurrence = Some(occurrence);
    true
}

/// Fans a notification out to every configured target.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Deliver to each target, or the fallback when none are configured.
    /// Failing targets are logged and skipped. Returns successful deliveries.
    pub fn dispatch(&self, targets: &[String], notification: &Notification) -> usize {
        let fallback = [FALLBACK_TARGET.to_string()];
        let targets = if targets.is_empty() { &fallback[..] } else { targets };

        let mut delivered = 0;
        for target in targets {
            match self.notifier.send(target, notification) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(target_service = %target, tag = %notification.tag, error = %e, "Notification delivery failed");
                }
            }
        }
        if delivered > 0 {
            tracing::info!(tag = %notification.tag, delivered, "Notification dispatched");
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Schedule;
    use crate::notifications::testing::RecordingNotifier;
    use chrono::NaiveDate;

    fn config() -> MedicationConfig {
        let mut config = MedicationConfig::new("Aspirin", Schedule::default());
        config.id = "asp".into();
        config.dosage = 2.0;
        config
    }

    #[test]
    fn reminder_carries_actions_and_tag() {
        let notification = build_reminder(&config(), false);
        assert_eq!(notification.title, "Medication Reminder");
        assert_eq!(notification.message, "Time to take 2 pills of Aspirin");
        assert_eq!(notification.tag, "dosekeeper_asp");
        let actions: Vec<&str> = notification.actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(actions, vec!["take_medication_asp", "snooze_medication_asp", "skip_medication_asp"]);

        assert_eq!(build_reminder(&config(), true).title, "Medication Reminder (Test)");
    }

    #[test]
    fn occurrence_is_claimed_once() {
        let occurrence = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let mut state = RuntimeState::default();
        assert!(claim_occurrence(&mut state, occurrence));
        assert!(!claim_occurrence(&mut state, occurrence));
        assert!(claim_occurrence(&mut state, occurrence + chrono::Duration::hours(12)));
    }

    #[test]
    fn empty_targets_use_fallback() {
        let recorder = Arc::new(RecordingNotifier::default());
        let dispatcher = NotificationDispatcher::new(recorder.clone());
        let delivered = dispatcher.dispatch(&[], &build_reminder(&config(), false));
        assert_eq!(delivered, 1);
        assert_eq!(recorder.sent()[0].0, FALLBACK_TARGET);
    }

    #[test]
    fn failing_target_does_not_block_others() {
        let recorder = Arc::new(RecordingNotifier {
            failing: vec!["notify.broken".into()],
            ..Default::default()
        });
        let dispatcher = NotificationDispatcher::new(recorder.clone());
        let targets = vec!["notify.broken".to_string(), "notify.phone".to_string()];
        assert_eq!(dispatcher.dispatch(&targets, &build_reminder(&config(), false)), 1);
        assert_eq!(recorder.sent()[0].0, "notify.phone");
    }
}
