//! Reminder notifications — building, deduplicating and dispatching them,
//! and mapping action identifiers coming back from the notification surface.

pub mod actions;
pub mod dispatcher;

pub use actions::*;
pub use dispatcher::*;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notify target {target} failed: {reason}")]
    Target { target: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    /// Replaces an earlier notification with the same tag on the device.
    pub tag: String,
    pub actions: Vec<NotificationAction>,
}

/// The notify-dispatch primitive: deliver one notification to one target.
pub trait Notifier: Send + Sync {
    fn send(&self, target: &str, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. Used when no delivery channel is wired.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, target: &str, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            target_service = %target,
            tag = %notification.tag,
            title = %notification.title,
            "{}",
            notification.message
        );
        Ok(())
    }
}
