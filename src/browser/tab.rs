use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::target::EventTargetDestroyed;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::BrowserSession;

#[derive(Debug, Error)]
pub enum TabError {
    #[error("Failed to open tab: {0}")]
    Create(String),
    #[error("Page wait failed: {0}")]
    Wait(String),
}

/// Resolves once the document has finished loading.
const LOAD_COMPLETE_SCRIPT: &str = r#"
new Promise(resolve => {
  if (document.readyState === "complete") resolve(true);
  else window.addEventListener("load", () => resolve(true));
})
"#;

/// Owns the single worker tab.
///
/// The tracked handle is a weak claim on the tab: when navigation fails
/// because the target is gone, or the close watcher sees the tab destroyed,
/// the handle is cleared and the next action opens a fresh tab. Losing the
/// tab is never an item failure.
pub struct TabController {
    session: Arc<BrowserSession>,
    slot: Arc<Mutex<Option<Page>>>,
    settle_delay: Duration,
}

impl TabController {
    pub fn new(session: Arc<BrowserSession>, settle_delay: Duration) -> Self {
        Self {
            session,
            slot: Arc::new(Mutex::new(None)),
            settle_delay,
        }
    }

    /// Navigate the tracked tab to `url`, replacing it if it no longer
    /// exists, or open one if none is tracked.
    pub async fn ensure_tab_at(&self, url: &str) -> Result<Page, TabError> {
        {
            let mut slot = self.slot.lock().await;
            if let Some(page) = slot.clone() {
                match page.goto(url).await {
                    Ok(_) => return Ok(page),
                    Err(err) => {
                        debug!(error = %err, "Tracked tab unreachable, replacing it");
                        *slot = None;
                    }
                }
            }
        }

        let page = self
            .session
            .new_page(url)
            .await
            .map_err(|e| TabError::Create(e.to_string()))?;
        self.watch_for_close(&page);
        *self.slot.lock().await = Some(page.clone());
        debug!(url, "Opened worker tab");
        Ok(page)
    }

    /// Suspend until the document load event fires, then apply the settle
    /// delay for the SPA's client-side rendering. The caller's action
    /// ceiling is the only timeout.
    pub async fn wait_for_ready(&self, page: &Page) -> Result<(), TabError> {
        page.evaluate(LOAD_COMPLETE_SCRIPT)
            .await
            .map_err(|e| TabError::Wait(e.to_string()))?;
        tokio::time::sleep(self.settle_delay).await;
        Ok(())
    }

    pub async fn has_tab(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    pub async fn clear(&self) {
        *self.slot.lock().await = None;
    }

    /// Clear the handle when the tab is closed by any actor, so the next
    /// action starts a fresh tab instead of using a stale reference.
    fn watch_for_close(&self, page: &Page) {
        let slot = Arc::clone(&self.slot);
        let target_id = page.target_id().clone();
        let page = page.clone();
        tokio::spawn(async move {
            let mut events = match page.event_listener::<EventTargetDestroyed>().await {
                Ok(events) => events,
                Err(err) => {
                    debug!(error = %err, "Tab close watcher unavailable");
                    return;
                }
            };
            while let Some(event) = events.next().await {
                if event.target_id == target_id {
                    warn!("Worker tab closed externally");
                    let mut guard = slot.lock().await;
                    if guard
                        .as_ref()
                        .is_some_and(|p| *p.target_id() == target_id)
                    {
                        *guard = None;
                    }
                    return;
                }
            }
        });
    }
}
