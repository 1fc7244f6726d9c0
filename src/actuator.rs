//! Page actuation: finding and clicking the follow/unfollow control on a
//! loaded profile page.
//!
//! The control heuristics live behind the [`PageActuator`] trait. The
//! shipped [`DomActuator`] matches button text the way the site renders it
//! today; it is best-effort by nature and expected to break when the
//! third-party markup changes, which is why the engine treats its failures
//! as retryable rather than fatal.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use thiserror::Error;
use tracing::debug;

use crate::queue::{ActionKind, QueueItem};

/// One actuation request, engine → actuator.
#[derive(Debug, Clone)]
pub struct ActuationRequest {
    pub action: ActionKind,
    pub username: String,
    pub profile_url: String,
}

impl From<&QueueItem> for ActuationRequest {
    fn from(item: &QueueItem) -> Self {
        Self {
            action: item.action,
            username: item.username.clone(),
            profile_url: item.profile_url.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ActuationError {
    /// The expected control was not on the page (wrong state, markup
    /// change, or the account already in the requested state).
    #[error("Could not find {action} button")]
    ControlNotFound { action: ActionKind },
    /// The worker tab failed underneath the action.
    #[error("Tab error: {0}")]
    Tab(String),
    /// The page was reachable but misbehaved (script error, bad state).
    #[error("{0}")]
    Page(String),
    /// The navigate + actuate round trip exceeded the ceiling.
    #[error("Timeout waiting for action to complete")]
    Timeout,
}

/// Capability interface the queue engine drives: given a loaded profile
/// page, perform the requested action.
#[async_trait]
pub trait PageActuator: Send + Sync {
    async fn actuate(&self, page: &Page, request: &ActuationRequest) -> Result<(), ActuationError>;
}

// ── DOM-text-matching implementation ────────────────────────────────────────

/// Locates controls by their visible text / aria-label, mirroring what a
/// user sees: a "Follow" button to follow, a "Following" button (plus a
/// confirmation dialog) to unfollow.
#[derive(Debug, Default)]
pub struct DomActuator;

/// True once the profile shell (header + main) has rendered.
const PAGE_READY_SCRIPT: &str =
    r#"!!(document.querySelector("header") && document.querySelector("main"))"#;

/// Click the first "Follow" control. Skips "Following"/"Requested" so an
/// already-followed account is reported as not-found instead of unfollowed.
const CLICK_FOLLOW_SCRIPT: &str = r#"
(() => {
  for (const el of document.querySelectorAll("button")) {
    const text = (el.textContent || "").toLowerCase().trim();
    const label = (el.getAttribute("aria-label") || "").toLowerCase();
    if ((text === "follow" || label === "follow")
        && !text.includes("following")
        && !text.includes("requested")) {
      el.click();
      return true;
    }
  }
  for (const el of document.querySelectorAll("div[role='button']")) {
    const text = (el.textContent || "").toLowerCase().trim();
    if (text === "follow") {
      el.click();
      return true;
    }
  }
  return false;
})()
"#;

/// Click the "Following" control to open the unfollow dialog.
const CLICK_FOLLOWING_SCRIPT: &str = r#"
(() => {
  for (const el of document.querySelectorAll("button")) {
    const text = (el.textContent || "").toLowerCase().trim();
    const label = (el.getAttribute("aria-label") || "").toLowerCase();
    if (text === "following" || text.includes("following") || label === "following") {
      el.click();
      return true;
    }
  }
  for (const el of document.querySelectorAll("div[role='button']")) {
    const text = (el.textContent || "").toLowerCase().trim();
    if (text === "following") {
      el.click();
      return true;
    }
  }
  return false;
})()
"#;

/// Click the "Unfollow" confirmation inside the dialog.
const CLICK_CONFIRM_SCRIPT: &str = r#"
(() => {
  for (const el of document.querySelectorAll("button")) {
    if ((el.textContent || "").toLowerCase().trim() === "unfollow") {
      el.click();
      return true;
    }
  }
  for (const el of document.querySelectorAll("div[role='button']")) {
    if ((el.textContent || "").toLowerCase().trim() === "unfollow") {
      el.click();
      return true;
    }
  }
  return false;
})()
"#;

const CONFIRM_ATTEMPTS: u32 = 10;
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(300);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);
const RENDER_GRACE: Duration = Duration::from_secs(1);

impl DomActuator {
    async fn eval_bool(&self, page: &Page, script: &str) -> Result<bool, ActuationError> {
        page.evaluate(script)
            .await
            .map_err(|e| ActuationError::Tab(e.to_string()))?
            .into_value::<bool>()
            .map_err(|e| ActuationError::Page(format!("Unexpected script result: {}", e)))
    }

    /// Poll until the SPA has rendered the profile shell. Unbounded on
    /// purpose: the engine's 30 s action ceiling drops this future.
    async fn wait_for_page_ready(&self, page: &Page) -> Result<(), ActuationError> {
        tokio::time::sleep(RENDER_GRACE).await;
        loop {
            if self.eval_bool(page, PAGE_READY_SCRIPT).await? {
                return Ok(());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn confirm_unfollow(&self, page: &Page, username: &str) -> Result<(), ActuationError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        for _ in 0..CONFIRM_ATTEMPTS {
            if self.eval_bool(page, CLICK_CONFIRM_SCRIPT).await? {
                return Ok(());
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
        // Some accounts unfollow without a dialog; treat a missing dialog
        // as completion rather than failure.
        debug!(username, "No unfollow confirmation dialog found, assuming completed");
        Ok(())
    }
}

#[async_trait]
impl PageActuator for DomActuator {
    async fn actuate(&self, page: &Page, request: &ActuationRequest) -> Result<(), ActuationError> {
        self.wait_for_page_ready(page).await?;

        // Give the buttons a moment to render after the shell appears.
        tokio::time::sleep(RENDER_GRACE).await;

        let script = match request.action {
            ActionKind::Follow => CLICK_FOLLOW_SCRIPT,
            ActionKind::Unfollow => CLICK_FOLLOWING_SCRIPT,
        };

        if !self.eval_bool(page, script).await? {
            return Err(ActuationError::ControlNotFound {
                action: request.action,
            });
        }

        if request.action == ActionKind::Unfollow {
            self.confirm_unfollow(page, &request.username).await?;
        }

        debug!(username = %request.username, action = %request.action, "Actuation clicked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::profile_url_for;

    #[test]
    fn request_from_item_carries_target() {
        let item = QueueItem::new(
            "alice".to_string(),
            profile_url_for("alice"),
            ActionKind::Unfollow,
        );
        let request = ActuationRequest::from(&item);
        assert_eq!(request.username, "alice");
        assert_eq!(request.action, ActionKind::Unfollow);
        assert_eq!(request.profile_url, "https://www.instagram.com/alice/");
    }

    #[test]
    fn control_not_found_names_the_action() {
        let err = ActuationError::ControlNotFound {
            action: ActionKind::Follow,
        };
        assert_eq!(err.to_string(), "Could not find follow button");
    }
}
