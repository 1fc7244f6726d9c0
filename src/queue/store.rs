use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::{ItemStatus, QueueItem};

/// Durable record of the action queue.
///
/// The whole ordered sequence is written as one JSON document after every
/// state-changing mutation and loaded wholesale at startup, so a process
/// restart loses at most the in-flight item's progress. Persistence is
/// best-effort: I/O failures are logged and swallowed, the in-memory queue
/// stays authoritative for the current process lifetime.
#[derive(Debug, Clone)]
pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last-saved queue, or an empty one if none exists.
    ///
    /// Items found `processing` are rewritten to `pending`: they reflect a
    /// run that was interrupted mid-action, not genuine progress.
    pub fn load(&self) -> Vec<QueueItem> {
        match self.try_load() {
            Ok(items) => items,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Failed to load queue store, starting empty");
                Vec::new()
            }
        }
    }

    /// Persist the full ordered sequence. Errors are logged, never raised.
    pub fn save(&self, items: &[QueueItem]) {
        if let Err(err) = self.try_save(items) {
            warn!(path = %self.path.display(), error = %err, "Failed to persist queue");
        }
    }

    fn try_load(&self) -> Result<Vec<QueueItem>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let mut items: Vec<QueueItem> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        for item in &mut items {
            if item.status == ItemStatus::Processing {
                debug!(username = %item.username, "Rewriting interrupted item to pending");
                item.status = ItemStatus::Pending;
            }
        }
        Ok(items)
    }

    fn try_save(&self, items: &[QueueItem]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        // Write-then-rename so a crash mid-write never clobbers the record.
        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(items).context("Failed to serialize queue")?;
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{ActionKind, profile_url_for};
    use tempfile::TempDir;

    fn item(username: &str, action: ActionKind) -> QueueItem {
        QueueItem::new(username.to_string(), profile_url_for(username), action)
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = QueueStore::new(dir.path().join("queue.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_and_load_preserves_order() {
        let dir = TempDir::new().unwrap();
        let store = QueueStore::new(dir.path().join("queue.json"));

        let items = vec![
            item("alice", ActionKind::Follow),
            item("bob", ActionKind::Unfollow),
            item("carol", ActionKind::Follow),
        ];
        store.save(&items);

        let loaded = store.load();
        let names: Vec<_> = loaded.iter().map(|i| i.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
        assert_eq!(loaded[1].action, ActionKind::Unfollow);
    }

    #[test]
    fn interrupted_processing_item_loads_as_pending() {
        let dir = TempDir::new().unwrap();
        let store = QueueStore::new(dir.path().join("queue.json"));

        let mut interrupted = item("alice", ActionKind::Follow);
        interrupted.status = ItemStatus::Processing;
        store.save(&[interrupted]);

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, ItemStatus::Pending);
    }

    #[test]
    fn corrupt_record_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "not json {").unwrap();

        let store = QueueStore::new(path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = QueueStore::new(dir.path().join("nested").join("queue.json"));
        store.save(&[item("alice", ActionKind::Follow)]);
        assert_eq!(store.load().len(), 1);
    }
}
