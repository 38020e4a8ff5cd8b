//! Store change notification
//!
//! Every successful write to the tree store is announced on an [`EventBus`]
//! so that long-lived subscriptions (SSE streams, `TreeStore::watch`) can
//! re-read the root they care about.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Change notifications emitted by the tree store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum StoreEvent {
    /// Something under the top-level `root` node was written
    Changed {
        root: String,
        timestamp: DateTime<Utc>,
    },
}

impl StoreEvent {
    pub fn changed(root: impl Into<String>) -> Self {
        StoreEvent::Changed {
            root: root.into(),
            timestamp: Utc::now(),
        }
    }

    /// Top-level node the event refers to
    pub fn root(&self) -> &str {
        match self {
            StoreEvent::Changed { root, .. } => root,
        }
    }
}

/// Broadcast channel for [`StoreEvent`]s.
///
/// Publishing never blocks; a subscriber that falls behind sees a lagged
/// error and should re-read its snapshot.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: StoreEvent) {
        let _ = self.tx.send(event);
    }
}
