use std::str::FromStr;

use crate::models::ActionVerb;

/// Upstream channels that deliver notification button presses.
pub const MOBILE_APP_ACTION_TOPIC: &str = "mobile_app_notification_action";
pub const IOS_ACTION_TOPIC: &str = "ios.notification_action_fired";
pub const NOTIFICATION_ACTION_TOPICS: [&str; 2] = [MOBILE_APP_ACTION_TOPIC, IOS_ACTION_TOPIC];

const ACTION_INFIX: &str = "_medication_";

pub fn action_id(verb: ActionVerb, medication_id: &str) -> String {
    format!("{}{ACTION_INFIX}{medication_id}", verb.as_str())
}

/// Inverse of [`action_id`]. Unknown verbs and empty ids give `None`.
pub fn parse_action(action: &str) -> Option<(ActionVerb, &str)> {
    let (verb, medication_id) = action.trim().split_once(ACTION_INFIX)?;
    let verb = ActionVerb::from_str(&verb.to_ascii_lowercase()).ok()?;
    if medication_id.is_empty() {
        return None;
    }
    Some((verb, medication_id))
}

pub fn is_notification_action_topic(topic: &str) -> bool {
    NOTIFICATION_ACTION_TOPICS
        .iter()
        .any(|t| t.eq_ignore_ascii_case(topic.trim()))
}
