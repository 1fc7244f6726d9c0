use std::sync::Arc;

use async_trait::async_trait;

use crate::actuator::{ActuationError, ActuationRequest, PageActuator};
use crate::queue::ActionExecutor;

use super::TabController;

/// Production executor: one action = ensure tab at the profile URL, wait
/// for it to render, hand the page to the actuator.
pub struct TabExecutor {
    tabs: TabController,
    actuator: Arc<dyn PageActuator>,
}

impl TabExecutor {
    pub fn new(tabs: TabController, actuator: Arc<dyn PageActuator>) -> Self {
        Self { tabs, actuator }
    }
}

#[async_trait]
impl ActionExecutor for TabExecutor {
    async fn execute(&self, request: &ActuationRequest) -> Result<(), ActuationError> {
        let page = self
            .tabs
            .ensure_tab_at(&request.profile_url)
            .await
            .map_err(|e| ActuationError::Tab(e.to_string()))?;
        self.tabs
            .wait_for_ready(&page)
            .await
            .map_err(|e| ActuationError::Tab(e.to_string()))?;
        self.actuator.actuate(&page, request).await
    }
}
