//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans [`ReviewEvent`]s out to every subscriber. Share it via
//! `Arc<EventBus>` between the store and whatever renders it.

use chrono::{DateTime, Utc};
use reelnote_core::types::EntityId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Dot-separated names of the events the review store publishes.
pub mod event_types {
    pub const ASSET_LOADED: &str = "asset.loaded";
    pub const THREAD_CREATED: &str = "thread.created";
    pub const THREAD_SHAPES_ADDED: &str = "thread.shapes_added";
    pub const COMMENT_ADDED: &str = "comment.added";
    pub const THREAD_RESOLVED: &str = "thread.resolved";
    pub const THREAD_REOPENED: &str = "thread.reopened";
    pub const STATUS_CHANGED: &str = "asset.status_changed";
    pub const SHARE_TOKEN_CREATED: &str = "asset.share_token_created";
    pub const COMMAND_ROLLED_BACK: &str = "command.rolled_back";
}

// ---------------------------------------------------------------------------
// ReviewEvent
// ---------------------------------------------------------------------------

/// Something changed on a review asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewEvent {
    /// One of [`event_types`].
    pub event_type: String,

    pub asset_id: EntityId,

    /// The thread concerned, for thread- and comment-level events.
    pub thread_id: Option<EntityId>,

    /// Event-specific data.
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl ReviewEvent {
    pub fn new(event_type: impl Into<String>, asset_id: EntityId) -> Self {
        Self {
            event_type: event_type.into(),
            asset_id,
            thread_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_thread(mut self, thread_id: EntityId) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
pub const DEFAULT_CAPACITY: usize = 256;

pub struct EventBus {
    sender: broadcast::Sender<ReviewEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// Slow receivers that fall more than `capacity` events behind observe
    /// `RecvError::Lagged` and should re-read the store.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to all current subscribers; dropped if there are none.
    pub fn publish(&self, event: ReviewEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReviewEvent> {
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
