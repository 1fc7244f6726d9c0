//! The action queue: data model, durable store, pacing policy, and the
//! engine that drains items against the live site one at a time.

pub mod engine;
pub mod pacing;
pub mod store;

pub use engine::{ActionExecutor, AdmissionError, EngineConfig, QueueEngine, StatusSnapshot};
pub use pacing::PacingPolicy;
pub use store::QueueStore;

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Which control the actuator seeks on the profile page.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ActionKind {
    Follow,
    Unfollow,
}

/// Lifecycle of one queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One requested action on one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub username: String,
    pub profile_url: String,
    pub action: ActionKind,
    pub status: ItemStatus,
    /// Incremented on each failed execution attempt, never decremented.
    pub attempts: u32,
    /// Last-failure description, present only once the item is failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix millis when the item was enqueued.
    pub created_at: u64,
    /// Reserved eligibility gate for future backoff scheduling. Nothing
    /// sets it today; selection skips an item deferred into the future.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_process_at: Option<u64>,
}

impl QueueItem {
    pub fn new(username: String, profile_url: String, action: ActionKind) -> Self {
        Self {
            username,
            profile_url,
            action,
            status: ItemStatus::Pending,
            attempts: 0,
            error: None,
            created_at: now_millis(),
            next_process_at: None,
        }
    }

    /// Eligible for selection: pending, and not deferred into the future.
    pub fn is_eligible(&self, now_ms: u64) -> bool {
        self.status == ItemStatus::Pending
            && self.next_process_at.is_none_or(|t| t <= now_ms)
    }
}

/// A batch entry as submitted over the bridge. `profile_url` may be
/// omitted, in which case the canonical profile URL is derived from the
/// username.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedUser {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
}

impl SubmittedUser {
    pub fn into_item(self, action: ActionKind) -> QueueItem {
        let profile_url = self
            .profile_url
            .unwrap_or_else(|| profile_url_for(&self.username));
        QueueItem::new(self.username, profile_url, action)
    }
}

/// Canonical profile URL for a username.
pub fn profile_url_for(username: &str) -> String {
    format!("https://www.instagram.com/{}/", username.trim())
}

/// Current time in unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_starts_pending_with_zero_attempts() {
        let item = QueueItem::new(
            "alice".to_string(),
            profile_url_for("alice"),
            ActionKind::Follow,
        );
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.attempts, 0);
        assert!(item.error.is_none());
        assert!(item.created_at > 0);
    }

    #[test]
    fn submitted_user_derives_profile_url() {
        let user = SubmittedUser {
            username: "alice".to_string(),
            profile_url: None,
        };
        let item = user.into_item(ActionKind::Unfollow);
        assert_eq!(item.profile_url, "https://www.instagram.com/alice/");

        let user = SubmittedUser {
            username: "bob".to_string(),
            profile_url: Some("https://www.instagram.com/bob.custom/".to_string()),
        };
        let item = user.into_item(ActionKind::Follow);
        assert_eq!(item.profile_url, "https://www.instagram.com/bob.custom/");
    }

    #[test]
    fn deferred_item_is_not_eligible() {
        let mut item = QueueItem::new(
            "alice".to_string(),
            profile_url_for("alice"),
            ActionKind::Follow,
        );
        let now = now_millis();
        assert!(item.is_eligible(now));
        item.next_process_at = Some(now + 60_000);
        assert!(!item.is_eligible(now));
        item.status = ItemStatus::Completed;
        item.next_process_at = None;
        assert!(!item.is_eligible(now));
    }

    #[test]
    fn wire_shape_is_camel_case() {
        let item = QueueItem::new(
            "alice".to_string(),
            profile_url_for("alice"),
            ActionKind::Follow,
        );
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["action"], "follow");
        assert_eq!(value["status"], "pending");
        assert!(value["profileUrl"].is_string());
        assert!(value["createdAt"].is_u64());
        assert!(value.get("error").is_none());
    }
}
