//! Queue-progress fan-out.
//!
//! The engine publishes a snapshot after every observable mutation; bridge
//! connections (and anything else holding a receiver) forward it to their
//! clients. Delivery is fire-and-forget: nobody listening, or a receiver
//! lagging behind, never affects the engine or other observers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::queue::{ActionKind, ItemStatus, QueueItem};

/// Per-item projection carried in progress broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemProgress {
    pub username: String,
    pub profile_url: String,
    pub action: ActionKind,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&QueueItem> for ItemProgress {
    fn from(item: &QueueItem) -> Self {
        Self {
            username: item.username.clone(),
            profile_url: item.profile_url.clone(),
            action: item.action,
            status: item.status,
            error: item.error.clone(),
        }
    }
}

/// Snapshot broadcast on every queue state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueProgress {
    pub queue: Vec<ItemProgress>,
    pub is_processing: bool,
}

impl QueueProgress {
    pub fn new(items: &[QueueItem], is_processing: bool) -> Self {
        Self {
            queue: items.iter().map(ItemProgress::from).collect(),
            is_processing,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<QueueProgress>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a snapshot to all current subscribers.
    pub fn publish(&self, progress: QueueProgress) {
        // send() errors only when no receiver exists, which is fine.
        let _ = self.tx.send(progress);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueProgress> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}
