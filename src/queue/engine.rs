use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::actuator::{ActuationError, ActuationRequest};
use crate::notify::{Notifier, QueueProgress};

use super::{ActionKind, ItemStatus, PacingPolicy, QueueItem, QueueStore, SubmittedUser, now_millis};

/// Executes one queued action end to end (navigate + actuate).
///
/// The production implementation drives the worker tab; tests substitute a
/// scripted stub. The engine never runs two executions concurrently.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, request: &ActuationRequest) -> Result<(), ActuationError>;
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Failed attempts allowed before an item is marked failed.
    pub retry_limit: u32,
    /// Ceiling for one navigate + actuate round trip.
    pub action_timeout: Duration,
    pub pacing: PacingPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_limit: 2,
            action_timeout: Duration::from_secs(30),
            pacing: PacingPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            retry_limit: config.queue.retry_limit,
            action_timeout: config.action_timeout(),
            pacing: PacingPolicy::new(
                Duration::from_millis(config.queue.min_delay_ms),
                Duration::from_millis(config.queue.max_delay_ms),
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("No users provided")]
    EmptyBatch,
}

/// Read-only view of the queue returned by [`QueueEngine::status`].
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub queue_length: usize,
    pub is_processing: bool,
    pub queue: Vec<QueueItem>,
}

struct EngineState {
    items: Vec<QueueItem>,
    draining: bool,
    /// Bumped on cancel so in-flight results from a cleared queue are
    /// recognized as stale and dropped.
    generation: u64,
}

/// The action queue state machine.
///
/// Items move `Pending → Processing → {Completed | Pending(retry) | Failed}`.
/// A single drain task processes the first pending item in queue order,
/// one at a time, persisting and broadcasting after every transition and
/// pausing for a randomized delay between actions.
pub struct QueueEngine {
    state: Mutex<EngineState>,
    store: QueueStore,
    executor: Arc<dyn ActionExecutor>,
    notifier: Notifier,
    config: EngineConfig,
}

impl QueueEngine {
    pub fn new(
        config: EngineConfig,
        store: QueueStore,
        executor: Arc<dyn ActionExecutor>,
        notifier: Notifier,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EngineState {
                items: Vec::new(),
                draining: false,
                generation: 0,
            }),
            store,
            executor,
            notifier,
            config,
        })
    }

    /// Load the persisted queue and resume draining if work remains.
    pub async fn load(self: &Arc<Self>) {
        let items = self.store.load();
        if !items.is_empty() {
            info!(count = items.len(), "Restored queue from disk");
        }
        {
            let mut state = self.state.lock().await;
            state.items = items;
        }
        self.maybe_start_drain().await;
    }

    /// Append a batch of users as pending items and kick the drain loop.
    ///
    /// Returns the new queue length. Empty batches are rejected and leave
    /// the queue untouched.
    pub async fn enqueue(
        self: &Arc<Self>,
        action: ActionKind,
        users: Vec<SubmittedUser>,
    ) -> Result<usize, AdmissionError> {
        if users.is_empty() {
            return Err(AdmissionError::EmptyBatch);
        }

        let count = users.len();
        let queue_length = {
            let mut state = self.state.lock().await;
            for user in users {
                state.items.push(user.into_item(action));
            }
            self.store.save(&state.items);
            self.notifier
                .publish(QueueProgress::new(&state.items, state.draining));
            state.items.len()
        };

        info!(count, action = %action, queue_length, "Batch enqueued");
        self.maybe_start_drain().await;
        Ok(queue_length)
    }

    /// Clear the whole queue and force idle, even mid-drain.
    ///
    /// An actuation already in flight is not aborted; its result arrives
    /// against a newer generation and is discarded.
    pub async fn cancel_all(&self) {
        let mut state = self.state.lock().await;
        state.items.clear();
        state.draining = false;
        state.generation += 1;
        self.store.save(&state.items);
        self.notifier.publish(QueueProgress::new(&state.items, false));
        info!("Queue cleared");
    }

    pub async fn status(&self) -> StatusSnapshot {
        let state = self.state.lock().await;
        StatusSnapshot {
            queue_length: state.items.len(),
            is_processing: state.draining,
            queue: state.items.clone(),
        }
    }

    /// Start the drain task unless one is already running or nothing is
    /// eligible. The draining flag makes idle/draining mutually exclusive.
    async fn maybe_start_drain(self: &Arc<Self>) {
        let generation = {
            let mut state = self.state.lock().await;
            if state.draining {
                return;
            }
            let now = now_millis();
            if !state.items.iter().any(|i| i.is_eligible(now)) {
                return;
            }
            state.draining = true;
            state.generation
        };

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.drain(generation).await;
        });
    }

    async fn drain(self: Arc<Self>, generation: u64) {
        info!("Queue draining started");

        loop {
            // Select the first eligible pending item, FIFO. Going idle
            // happens under the same lock so a batch enqueued while we
            // decide cannot be stranded behind a stale draining flag.
            let request = {
                let mut state = self.state.lock().await;
                if state.generation != generation {
                    return;
                }
                let now = now_millis();
                match state.items.iter().position(|i| i.is_eligible(now)) {
                    Some(idx) => {
                        state.items[idx].status = ItemStatus::Processing;
                        let request = ActuationRequest::from(&state.items[idx]);
                        self.store.save(&state.items);
                        self.notifier.publish(QueueProgress::new(&state.items, true));
                        Some(request)
                    }
                    None => {
                        state.draining = false;
                        self.notifier.publish(QueueProgress::new(&state.items, false));
                        None
                    }
                }
            };

            let Some(request) = request else {
                info!("Queue draining complete");
                return;
            };

            debug!(username = %request.username, action = %request.action, "Processing item");

            let outcome = match tokio::time::timeout(
                self.config.action_timeout,
                self.executor.execute(&request),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ActuationError::Timeout),
            };

            // Record the outcome, unless the queue was cancelled while the
            // action was in flight.
            let more_pending = {
                let mut state = self.state.lock().await;
                if state.generation != generation {
                    debug!(username = %request.username, "Discarding stale actuation result");
                    return;
                }

                if let Some(item) = state
                    .items
                    .iter_mut()
                    .find(|i| i.status == ItemStatus::Processing)
                {
                    match &outcome {
                        Ok(()) => {
                            item.status = ItemStatus::Completed;
                            info!(username = %item.username, action = %item.action, "Action completed");
                        }
                        Err(err) => {
                            item.attempts += 1;
                            if item.attempts < self.config.retry_limit {
                                item.status = ItemStatus::Pending;
                                warn!(
                                    username = %item.username,
                                    attempts = item.attempts,
                                    error = %err,
                                    "Action failed, will retry"
                                );
                            } else {
                                item.status = ItemStatus::Failed;
                                item.error = Some(err.to_string());
                                warn!(
                                    username = %item.username,
                                    attempts = item.attempts,
                                    error = %err,
                                    "Action failed permanently"
                                );
                            }
                        }
                    }
                }

                self.store.save(&state.items);
                self.notifier.publish(QueueProgress::new(&state.items, true));
                let now = now_millis();
                state.items.iter().any(|i| i.is_eligible(now))
            };

            if more_pending {
                let delay = self.config.pacing.next_delay();
                debug!(delay_ms = delay.as_millis() as u64, "Pacing before next action");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
