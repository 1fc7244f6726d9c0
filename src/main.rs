use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use followbridge::actuator::DomActuator;
use followbridge::browser::{BrowserSession, TabController, TabExecutor};
use followbridge::client::BridgeClient;
use followbridge::config::Config;
use followbridge::daemon;
use followbridge::diff;
use followbridge::gateway::{self, BridgeOptions};
use followbridge::notify::Notifier;
use followbridge::queue::{ActionKind, EngineConfig, QueueEngine, QueueStore, SubmittedUser};

#[derive(Parser)]
#[command(
    name = "followbridge",
    version,
    about = "Compare Instagram export files and drive follow/unfollow actions through a real browser tab"
)]
struct Cli {
    /// Path to config.toml (defaults to ~/.followbridge/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bridge in the foreground (worker browser + WebSocket server)
    Run {
        /// Listen address override, e.g. 127.0.0.1:8750
        #[arg(long)]
        listen: Option<String>,
        /// Run the worker browser headless
        #[arg(long)]
        headless: bool,
    },
    /// Start the bridge as a detached background daemon
    Start {
        /// Listen address override passed through to `run`
        #[arg(long)]
        listen: Option<String>,
    },
    /// Stop the background daemon
    Stop,
    /// Show whether the background daemon is running
    Status,
    /// Compare followers/following export files
    Diff {
        /// Followers export file (followers_1.json)
        followers: PathBuf,
        /// Following export file (following.json)
        following: PathBuf,
        /// Write the accounts not following you back as a batch file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Submit a batch of usernames to a running bridge
    Submit {
        /// Action to queue for every user in the batch
        #[arg(long, value_enum)]
        action: ActionKind,
        /// Batch file written by `diff --out` (JSON array of users)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Usernames given directly on the command line
        usernames: Vec<String>,
        /// Bridge address (defaults to the configured listen address)
        #[arg(long)]
        bridge: Option<String>,
    },
    /// Show a running bridge's queue
    Queue {
        #[arg(long)]
        bridge: Option<String>,
    },
    /// Clear a running bridge's queue
    Cancel {
        #[arg(long)]
        bridge: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.clone())?;

    match cli.command {
        Command::Run { listen, headless } => cmd_run(config, listen, headless).await,
        Command::Start { listen } => cmd_start(&config, listen),
        Command::Stop => cmd_stop(&config),
        Command::Status => cmd_status(&config),
        Command::Diff {
            followers,
            following,
            out,
        } => cmd_diff(&followers, &following, out.as_deref()),
        Command::Submit {
            action,
            file,
            usernames,
            bridge,
        } => cmd_submit(&config, action, file, usernames, bridge).await,
        Command::Queue { bridge } => cmd_queue(&config, bridge).await,
        Command::Cancel { bridge } => cmd_cancel(&config, bridge).await,
    }
}

// ── Bridge runtime ──────────────────────────────────────────────────────────

async fn cmd_run(mut config: Config, listen: Option<String>, headless: bool) -> Result<()> {
    if let Some(listen) = listen {
        config.bridge.listen = listen;
    }
    if headless {
        config.browser.headless = true;
    }

    let session = Arc::new(BrowserSession::launch(&config.browser).await?);
    let tabs = TabController::new(Arc::clone(&session), config.settle_delay());
    let executor = Arc::new(TabExecutor::new(tabs, Arc::new(DomActuator)));

    let notifier = Notifier::default();
    let store = QueueStore::new(config.queue_store_path());
    let engine = QueueEngine::new(
        EngineConfig::from_config(&config),
        store,
        executor,
        notifier.clone(),
    );
    engine.load().await;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            signal_cancel.cancel();
        }
    });

    let options = BridgeOptions {
        listen: config.bridge.listen.clone(),
    };
    gateway::run_bridge(engine, notifier, options, cancel).await?;

    session.close().await;
    Ok(())
}

// ── Daemon management ───────────────────────────────────────────────────────

fn cmd_start(config: &Config, listen: Option<String>) -> Result<()> {
    let listen = listen.unwrap_or_else(|| config.bridge.listen.clone());
    let pid = daemon::start(&config.settings_dir, &listen, &[])?;
    println!(
        "{} bridge started (PID {}) listening on {}",
        "✓".green(),
        pid,
        listen
    );
    println!(
        "  logs: {}",
        daemon::log_path(&config.settings_dir).display()
    );
    Ok(())
}

fn cmd_stop(config: &Config) -> Result<()> {
    match daemon::stop(&config.settings_dir)? {
        daemon::StopResult::Stopped { pid } => {
            println!("{} bridge stopped (PID {})", "✓".green(), pid);
        }
        daemon::StopResult::WasStale { pid } => {
            println!(
                "{} bridge was not running (stale PID {} cleaned up)",
                "⚠".yellow(),
                pid
            );
        }
        daemon::StopResult::WasNotRunning => {
            println!("{} bridge is not running", "⚠".yellow());
        }
    }
    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    match daemon::status(&config.settings_dir) {
        daemon::DaemonStatus::Running { pid } => {
            println!("{} bridge running (PID {})", "✓".green(), pid);
        }
        daemon::DaemonStatus::Stale { pid } => {
            println!("{} stale PID file ({}), bridge is dead", "⚠".yellow(), pid);
        }
        daemon::DaemonStatus::Stopped => {
            println!("bridge is not running");
        }
    }
    Ok(())
}

// ── Diff ────────────────────────────────────────────────────────────────────

fn cmd_diff(followers_path: &Path, following_path: &Path, out: Option<&Path>) -> Result<()> {
    let followers = diff::load_followers(followers_path)?;
    let following = diff::load_following(following_path)?;
    let result = diff::compute_diff(followers, following);

    println!(
        "{} followers, {} following, {} mutual",
        result.followers.len().to_string().bold(),
        result.following.len().to_string().bold(),
        result.mutual_followers.len().to_string().bold(),
    );

    println!(
        "\n{} ({})",
        "Not following you back".red().bold(),
        result.not_following_back.len()
    );
    for account in &result.not_following_back {
        println!("  {}", account.username);
    }

    println!(
        "\n{} ({})",
        "You don't follow back".yellow().bold(),
        result.you_dont_follow_back.len()
    );
    for account in &result.you_dont_follow_back {
        println!("  {}", account.username);
    }

    if let Some(out) = out {
        let batch = diff::to_submitted(&result.not_following_back);
        let content = serde_json::to_string_pretty(&batch)?;
        std::fs::write(out, content)
            .with_context(|| format!("Failed to write batch file {}", out.display()))?;
        println!(
            "\n{} wrote {} accounts to {}",
            "✓".green(),
            batch.len(),
            out.display()
        );
    }

    Ok(())
}

// ── Bridge client commands ──────────────────────────────────────────────────

fn bridge_addr(config: &Config, bridge: Option<String>) -> String {
    bridge.unwrap_or_else(|| config.bridge.listen.clone())
}

async fn cmd_submit(
    config: &Config,
    action: ActionKind,
    file: Option<PathBuf>,
    usernames: Vec<String>,
    bridge: Option<String>,
) -> Result<()> {
    let mut users: Vec<SubmittedUser> = Vec::new();

    if let Some(file) = file {
        let content = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read batch file {}", file.display()))?;
        let batch: Vec<SubmittedUser> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse batch file {}", file.display()))?;
        users.extend(batch);
    }
    users.extend(usernames.into_iter().map(|username| SubmittedUser {
        username,
        profile_url: None,
    }));

    if users.is_empty() {
        bail!("No users provided — pass usernames or --file");
    }

    let mut client = BridgeClient::connect(&bridge_addr(config, bridge)).await?;
    let response = client.submit(action, &users).await?;
    client.close().await;

    if response["success"].as_bool().unwrap_or(false) {
        println!(
            "{} {}",
            "✓".green(),
            response["message"].as_str().unwrap_or("submitted")
        );
        println!(
            "  queue length: {}",
            response["queueLength"].as_u64().unwrap_or(0)
        );
    } else {
        bail!(
            "Bridge rejected the batch: {}",
            response["error"].as_str().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn cmd_queue(config: &Config, bridge: Option<String>) -> Result<()> {
    let mut client = BridgeClient::connect(&bridge_addr(config, bridge)).await?;
    let response = client.status().await?;
    client.close().await;

    let processing = response["isProcessing"].as_bool().unwrap_or(false);
    let length = response["queueLength"].as_u64().unwrap_or(0);
    println!(
        "{} items, {}",
        length,
        if processing {
            "processing".yellow().to_string()
        } else {
            "idle".to_string()
        }
    );

    if let Some(queue) = response["queue"].as_array() {
        for item in queue {
            let status = item["status"].as_str().unwrap_or("?");
            let colored_status = match status {
                "completed" => status.green().to_string(),
                "failed" => status.red().to_string(),
                "processing" => status.yellow().to_string(),
                _ => status.to_string(),
            };
            let error = item["error"]
                .as_str()
                .map(|e| format!(" — {}", e))
                .unwrap_or_default();
            println!(
                "  {:<24} {:<9} {}{}",
                item["username"].as_str().unwrap_or("?"),
                item["action"].as_str().unwrap_or("?"),
                colored_status,
                error
            );
        }
    }
    Ok(())
}

async fn cmd_cancel(config: &Config, bridge: Option<String>) -> Result<()> {
    let mut client = BridgeClient::connect(&bridge_addr(config, bridge)).await?;
    let response = client.cancel_all().await?;
    client.close().await;

    println!(
        "{} {}",
        "✓".green(),
        response["message"].as_str().unwrap_or("queue cleared")
    );
    Ok(())
}
