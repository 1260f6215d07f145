//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`TaskEvent`]s. It is
//! designed to be shared via `Arc<EventBus>` across the application.

use capgen_core::types::{DbId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event name for a freshly enqueued task.
pub const TASK_CREATED: &str = "task.created";
/// Event name for a claimed task entering execution.
pub const TASK_STARTED: &str = "task.started";
/// Event name for successful completion.
pub const TASK_COMPLETED: &str = "task.completed";
/// Event name for failure (runner error, panic, or stale reap).
pub const TASK_FAILED: &str = "task.failed";
/// Event name for owner/admin cancellation.
pub const TASK_CANCELLED: &str = "task.cancelled";

// ---------------------------------------------------------------------------
// TaskEvent
// ---------------------------------------------------------------------------

/// A task lifecycle event.
///
/// Constructed via [`TaskEvent::new`] and enriched with
/// [`with_payload`](TaskEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Dot-separated event name, e.g. `"task.completed"`.
    pub event_type: String,

    /// The task the event refers to.
    pub task_id: TaskId,

    /// The task's owner.
    pub owner_id: DbId,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl TaskEvent {
    /// Create a new event with an empty payload.
    pub fn new(event_type: impl Into<String>, task_id: TaskId, owner_id: DbId) -> Self {
        Self {
            event_type: event_type.into(),
            task_id,
            owner_id,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`TaskEvent`].
pub struct EventBus {
    sender: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: TaskEvent) {
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
