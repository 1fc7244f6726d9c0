pub mod actuator;
pub mod browser;
pub mod client;
pub mod config;
pub mod daemon;
pub mod diff;
pub mod gateway;
pub mod notify;
pub mod queue;

// Re-export the core queue types at crate root for convenience
pub use queue::{ActionKind, ItemStatus, QueueEngine, QueueItem, SubmittedUser};
