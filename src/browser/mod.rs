//! Ownership of the worker browser.
//!
//! One Chromium instance is launched over CDP with a persistent user-data
//! directory so the user's logged-in session carries across runs. The
//! bridge performs no authentication of its own.

pub mod executor;
pub mod tab;

pub use executor::TabExecutor;
pub use tab::TabController;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chromiumoxide::BrowserConfig as CdpConfig;
use chromiumoxide::browser::{Browser, HeadlessMode};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct BrowserSession {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch the worker browser with the configured profile.
    pub async fn launch(settings: &crate::config::BrowserConfig) -> Result<Self> {
        let profile_dir = settings
            .profile_dir
            .clone()
            .unwrap_or_else(default_profile_dir);
        std::fs::create_dir_all(&profile_dir)
            .with_context(|| format!("Failed to create profile dir {}", profile_dir.display()))?;

        let mut builder = CdpConfig::builder()
            .user_data_dir(&profile_dir)
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-blink-features=AutomationControlled");
        builder = if settings.headless {
            builder.headless_mode(HeadlessMode::New)
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser — is Chrome/Chromium installed?")?;

        // The handler stream must be polled for the browser to function.
        let handler_task = tokio::spawn(async move {
            while let Some(_event) = handler.next().await {}
        });

        info!(
            profile = %profile_dir.display(),
            headless = settings.headless,
            "Browser launched"
        );

        Ok(Self {
            browser: Mutex::new(browser),
            handler_task,
        })
    }

    /// Open a new tab at `url`.
    pub async fn new_page(&self, url: &str) -> Result<Page, CdpError> {
        self.browser.lock().await.new_page(url).await
    }

    /// Close the browser and stop the event handler.
    pub async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(err) = browser.close().await {
            debug!(error = %err, "Browser close reported an error");
        }
        let _ = browser.wait().await;
        self.handler_task.abort();
    }
}

/// Dedicated profile under the platform data dir, used when the config
/// does not point at an existing browser profile.
pub fn default_profile_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("followbridge")
        .join("browser-profile")
}
