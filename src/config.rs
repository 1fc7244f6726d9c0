use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Settings directory (PID file, queue store, logs)
    pub settings_dir: PathBuf,
    /// Bridge WebSocket server settings
    pub bridge: BridgeConfig,
    /// Queue pacing and retry settings
    pub queue: QueueConfig,
    /// Worker browser settings
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Listen address for the WebSocket bridge, e.g. "127.0.0.1:8750"
    pub listen: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Minimum delay between actions, in milliseconds
    pub min_delay_ms: u64,
    /// Maximum delay between actions, in milliseconds (exclusive bound)
    pub max_delay_ms: u64,
    /// How many failed attempts before an item is marked failed
    pub retry_limit: u32,
    /// Ceiling for one navigate + actuate round trip, in seconds
    pub action_timeout_secs: u64,
    /// Override for the queue store path (defaults to <settings_dir>/queue.json)
    pub store_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run the worker browser headless. Defaults to false so the user can
    /// watch the tab and stay logged in with their normal profile.
    pub headless: bool,
    /// Chromium user-data directory. Defaults to a dedicated profile under
    /// the platform data dir; point it at an existing profile to reuse a
    /// logged-in session.
    pub profile_dir: Option<PathBuf>,
    /// Settle delay after page load, in milliseconds, to let the SPA render
    pub settle_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            settings_dir: home_dir.join(".followbridge"),
            bridge: BridgeConfig {
                listen: "127.0.0.1:8750".to_string(),
            },
            queue: QueueConfig {
                min_delay_ms: 30_000,
                max_delay_ms: 60_000,
                retry_limit: 2,
                action_timeout_secs: 30,
                store_path: None,
            },
            browser: BrowserConfig {
                headless: false,
                profile_dir: None,
                settle_delay_ms: 2_000,
            },
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
            home_dir.join(".followbridge").join("config.toml")
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: Option<PathBuf>) -> Result<()> {
        let config_path = if let Some(p) = path {
            p
        } else {
            self.settings_dir.join("config.toml")
        };

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Path of the durable queue record
    pub fn queue_store_path(&self) -> PathBuf {
        self.queue
            .store_path
            .clone()
            .unwrap_or_else(|| self.settings_dir.join("queue.json"))
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.queue.action_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.browser.settle_delay_ms)
    }
}
