//! Event bus — topic-addressed events fanned out over a tokio broadcast
//! channel.
//!
//! Each subscription runs its handler on its own task and only sees events
//! whose topic matches (case-insensitively). Handlers run one event at a
//! time, in publish order.

use std::future::Future;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Events beyond this many unread are dropped for slow subscribers.
const DEFAULT_BUFFER_SIZE: usize = 256;

/// Sensor state reports: `{entity_id, state, attributes?, last_changed?}`.
pub const STATE_CHANGED_TOPIC: &str = "state_changed";

#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    pub topic: String,
    pub payload: Value,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Returns how many subscriptions received it.
    pub fn publish(&self, topic: impl Into<String>, payload: Value) -> usize {
        self.sender
            .send(BusEvent {
                topic: topic.into(),
                payload,
            })
            .unwrap_or_default()
    }

    /// Run `handler` for every event on `topic` until the handle is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<F, Fut>(&self, topic: &str, handler: F) -> Subscription
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut receiver = self.sender.subscribe();
        let topic = topic.to_string();
        let task_topic = topic.clone();
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.topic.eq_ignore_ascii_case(&task_topic) => {
                        handler(event.payload).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(topic = %task_topic, skipped, "Event subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        tracing::debug!(topic = %topic, "Subscribed to topic");
        Subscription { topic, task }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Live subscription. Dropping it stops the handler task.
pub struct Subscription {
    topic: String,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
