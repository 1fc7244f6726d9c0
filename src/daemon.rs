//! Bridge daemon management — PID file, spawn, stop, status.
//!
//! `followbridge start` re-executes the current binary with the `run`
//! subcommand as a detached background process, writes a PID file to
//! `<settings_dir>/bridge.pid`, and redirects output to
//! `<settings_dir>/logs/bridge.log`.
//!
//! `followbridge stop` reads that PID file and terminates the process.
//! `followbridge status` checks if the recorded PID is still alive.
//!
//! All process management uses `sysinfo` and `which` for cross-platform
//! support (macOS, Linux, Windows) with no `cfg(unix)` gates.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use sysinfo::{Pid, Signal, System};

// ── PID file helpers ────────────────────────────────────────────────────────

/// Returns the path to the PID file: `<settings_dir>/bridge.pid`.
pub fn pid_path(settings_dir: &Path) -> PathBuf {
    settings_dir.join("bridge.pid")
}

/// Returns the path to the bridge log file: `<settings_dir>/logs/bridge.log`.
pub fn log_path(settings_dir: &Path) -> PathBuf {
    settings_dir.join("logs").join("bridge.log")
}

/// Write a PID to the PID file.
pub fn write_pid(settings_dir: &Path, pid: u32) -> Result<()> {
    let path = pid_path(settings_dir);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, pid.to_string())
        .with_context(|| format!("Failed to write PID file {}", path.display()))
}

/// Read the stored PID, if the file exists and is valid.
pub fn read_pid(settings_dir: &Path) -> Option<u32> {
    let path = pid_path(settings_dir);
    fs::read_to_string(&path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

/// Remove the PID file.
pub fn remove_pid(settings_dir: &Path) {
    let path = pid_path(settings_dir);
    let _ = fs::remove_file(&path);
}

/// Check whether a process with the given PID is alive.
pub fn is_process_alive(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes(
        sysinfo::ProcessesToUpdate::Some(&[Pid::from_u32(pid)]),
        true,
    );
    sys.process(Pid::from_u32(pid)).is_some()
}

// ── High-level daemon operations ────────────────────────────────────────────

/// Status of the bridge daemon.
#[derive(Debug, Clone)]
pub enum DaemonStatus {
    /// Running with the given PID.
    Running { pid: u32 },
    /// PID file exists but the process is dead.
    Stale { pid: u32 },
    /// No PID file — not running.
    Stopped,
}

/// Check the current daemon status.
pub fn status(settings_dir: &Path) -> DaemonStatus {
    match read_pid(settings_dir) {
        Some(pid) => {
            if is_process_alive(pid) {
                DaemonStatus::Running { pid }
            } else {
                DaemonStatus::Stale { pid }
            }
        }
        None => DaemonStatus::Stopped,
    }
}

/// Spawn `followbridge run` as a detached background process.
pub fn start(settings_dir: &Path, listen: &str, extra_args: &[String]) -> Result<u32> {
    // If already running, bail.
    if let DaemonStatus::Running { pid } = status(settings_dir) {
        anyhow::bail!("Bridge is already running (PID {})", pid);
    }

    // Clean up stale PID file.
    remove_pid(settings_dir);

    let bridge_bin = resolve_bridge_binary()?;

    // Ensure log directory exists.
    let log = log_path(settings_dir);
    if let Some(parent) = log.parent() {
        fs::create_dir_all(parent)?;
    }

    let log_file = fs::File::create(&log)
        .with_context(|| format!("Failed to create bridge log at {}", log.display()))?;
    let log_stderr = log_file
        .try_clone()
        .context("Failed to clone log file handle")?;

    let mut cmd = Command::new(&bridge_bin);
    cmd.arg("run")
        .arg("--listen")
        .arg(listen)
        .stdout(log_file)
        .stderr(log_stderr);

    for a in extra_args {
        cmd.arg(a);
    }

    // Platform-specific detach so the child survives our exit.
    detach_child(&mut cmd);

    let child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn {}", bridge_bin.display()))?;

    let pid = child.id();
    write_pid(settings_dir, pid)?;

    Ok(pid)
}

/// Stop a running bridge by terminating the process.
pub fn stop(settings_dir: &Path) -> Result<StopResult> {
    match status(settings_dir) {
        DaemonStatus::Running { pid } => {
            kill_process(pid)?;
            // Wait briefly for the process to exit.
            for _ in 0..20 {
                std::thread::sleep(std::time::Duration::from_millis(100));
                if !is_process_alive(pid) {
                    remove_pid(settings_dir);
                    return Ok(StopResult::Stopped { pid });
                }
            }
            // Process still alive after 2s — it may be shutting down slowly.
            // Remove PID file anyway; the OS will finish cleanup.
            remove_pid(settings_dir);
            Ok(StopResult::Stopped { pid })
        }
        DaemonStatus::Stale { pid } => {
            remove_pid(settings_dir);
            Ok(StopResult::WasStale { pid })
        }
        DaemonStatus::Stopped => Ok(StopResult::WasNotRunning),
    }
}

#[derive(Debug)]
pub enum StopResult {
    Stopped { pid: u32 },
    WasStale { pid: u32 },
    WasNotRunning,
}

/// Terminate a process by PID using `sysinfo`.
/// Sends SIGTERM on Unix, TerminateProcess on Windows.
fn kill_process(pid: u32) -> Result<()> {
    let sysinfo_pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(
        sysinfo::ProcessesToUpdate::Some(&[sysinfo_pid]),
        true,
    );
    let process = sys
        .process(sysinfo_pid)
        .context(format!("Process {} not found", pid))?;

    if !process.kill_with(Signal::Term).unwrap_or(false) {
        // Fallback: hard kill if graceful signal unsupported (e.g. Windows
        // doesn't have SIGTERM — kill_with(Term) returns false).
        process.kill();
    }
    Ok(())
}

/// Configure a `Command` to detach the child from the parent session.
#[cfg(unix)]
fn detach_child(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    // Create a new process group so the child isn't killed when the
    // parent's terminal closes.
    cmd.process_group(0);
}

#[cfg(windows)]
fn detach_child(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    // CREATE_NEW_PROCESS_GROUP (0x200) | DETACHED_PROCESS (0x08)
    cmd.creation_flags(0x0000_0208);
}

#[cfg(not(any(unix, windows)))]
fn detach_child(_cmd: &mut Command) {
    // No detach on unknown platforms — the child may be tied to our terminal.
}

/// Find the binary to re-execute. Checks:
/// 1. The currently running executable.
/// 2. On `$PATH` via the `which` crate (cross-platform).
fn resolve_bridge_binary() -> Result<PathBuf> {
    if let Ok(current_exe) = std::env::current_exe() {
        if current_exe.is_file() {
            return Ok(current_exe);
        }
    }

    let name = if cfg!(windows) {
        "followbridge.exe"
    } else {
        "followbridge"
    };
    if let Ok(path) = which::which(name) {
        return Ok(path);
    }

    anyhow::bail!(
        "Could not find the `followbridge` binary.\n\
         Make sure it is installed or built (`cargo build`) and on your PATH."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn pid_file_round_trip() {
        let dir = TempDir::new().unwrap();
        assert!(read_pid(dir.path()).is_none());

        write_pid(dir.path(), 4242).unwrap();
        assert_eq!(read_pid(dir.path()), Some(4242));

        remove_pid(dir.path());
        assert!(read_pid(dir.path()).is_none());
    }

    #[test]
    fn garbage_pid_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        std::fs::write(pid_path(dir.path()), "not a pid").unwrap();
        assert!(read_pid(dir.path()).is_none());
    }
}
