//! Long-running poller.
//!
//! Each enabled platform gets its own loop, context and cadence; the loops
//! run concurrently and share only the store. A PID file keeps a second
//! daemon from starting, and SIGINT/SIGTERM cancel every loop.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::app::{AppContext, Result, SedimentError};
use crate::config::MIN_POLL_INTERVAL_SECS;
use crate::domain::{Platform, SyncStats};
use crate::sync::CycleError;

/// Stats summary cadence.
pub const STATS_INTERVAL: Duration = Duration::from_secs(300);

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Overrides every platform's configured poll interval.
    pub interval_secs: Option<u64>,
    /// Whether to run a cycle immediately on start
    pub update_on_start: bool,
    pub stats_interval: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_secs: None,
            update_on_start: true,
            stats_interval: STATS_INTERVAL,
        }
    }
}

impl DaemonConfig {
    /// Parse interval string like "30s", "1h", "30m", "6h", "1d"
    pub fn parse_interval(s: &str) -> std::result::Result<u64, String> {
        let s = s.trim().to_lowercase();

        if let Some(hours) = s.strip_suffix('h') {
            hours
                .parse::<u64>()
                .map(|h| h * 3600)
                .map_err(|_| format!("Invalid hours: {}", hours))
        } else if let Some(minutes) = s.strip_suffix('m') {
            minutes
                .parse::<u64>()
                .map(|m| m * 60)
                .map_err(|_| format!("Invalid minutes: {}", minutes))
        } else if let Some(days) = s.strip_suffix('d') {
            days.parse::<u64>()
                .map(|d| d * 86400)
                .map_err(|_| format!("Invalid days: {}", days))
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map_err(|_| format!("Invalid seconds: {}", secs))
        } else {
            s.parse::<u64>()
                .map_err(|_| format!("Invalid interval: {}. Use format like '30s', '5m', '1h'", s))
        }
    }

    /// `parse_interval` plus the minimum poll interval the config enforces.
    pub fn parse_poll_interval(s: &str) -> std::result::Result<u64, String> {
        let secs = Self::parse_interval(s)?;
        if secs < MIN_POLL_INTERVAL_SECS {
            return Err(format!(
                "Interval {} is too short, minimum is {}",
                Self::format_interval(secs),
                Self::format_interval(MIN_POLL_INTERVAL_SECS)
            ));
        }
        Ok(secs)
    }

    /// Format interval for display
    pub fn format_interval(secs: u64) -> String {
        if secs >= 86400 && secs % 86400 == 0 {
            format!("{}d", secs / 86400)
        } else if secs >= 3600 && secs % 3600 == 0 {
            format!("{}h", secs / 3600)
        } else if secs >= 60 && secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }
}

/// Daemon runner
pub struct Daemon {
    ctx: Arc<AppContext>,
    config: DaemonConfig,
    cancel: CancellationToken,
}

impl Daemon {
    pub fn new(ctx: Arc<AppContext>, config: DaemonConfig) -> Self {
        Self {
            ctx,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops every platform loop when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Get the PID file path
    pub fn pid_file_path() -> Option<PathBuf> {
        dirs::runtime_dir()
            .or_else(dirs::cache_dir)
            .map(|d| d.join("sediment").join("daemon.pid"))
    }

    fn running_pid() -> Option<u32> {
        match status_at(&Self::pid_file_path()?) {
            Ok(DaemonStatus::Running(pid)) => Some(pid),
            _ => None,
        }
    }

    #[cfg(unix)]
    fn process_exists(pid: u32) -> bool {
        use std::process::Command;
        Command::new("kill")
            .args(["-0", &pid.to_string()])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[cfg(windows)]
    fn process_exists(pid: u32) -> bool {
        use std::process::Command;
        Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid)])
            .output()
            .map(|o| String::from_utf8_lossy(&o.stdout).contains(&pid.to_string()))
            .unwrap_or(false)
    }

    fn write_pid_file(&self) -> std::io::Result<()> {
        if let Some(pid_path) = Self::pid_file_path() {
            if let Some(parent) = pid_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = fs::File::create(&pid_path)?;
            writeln!(file, "{}", std::process::id())?;
        }
        Ok(())
    }

    fn remove_pid_file(&self) {
        if let Some(pid_path) = Self::pid_file_path() {
            let _ = fs::remove_file(pid_path);
        }
    }

    /// Run until a signal arrives or the cancel token fires.
    pub async fn run(&self) -> Result<Vec<SyncStats>> {
        if let Some(pid) = Self::running_pid() {
            return Err(SedimentError::Other(format!(
                "Another daemon instance is already running (PID {})",
                pid
            )));
        }

        self.write_pid_file()
            .map_err(|e| SedimentError::Other(format!("Failed to write PID file: {}", e)))?;

        tokio::spawn(shutdown_on_signal(self.cancel.clone()));

        let platforms = self.ctx.platforms();
        tracing::info!(
            pid = std::process::id(),
            platforms = ?platforms,
            "sediment daemon started"
        );

        let results = self.run_platforms(&platforms).await;
        self.remove_pid_file();

        let mut stats = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(s) => {
                    tracing::info!("Final statistics: {}", s);
                    stats.push(s);
                }
                Err(e) => tracing::error!(error = %e, "Platform loop stopped"),
            }
        }
        tracing::info!("Daemon shut down");
        Ok(stats)
    }

    /// Drive every platform loop to completion, without the PID guard.
    pub async fn run_platforms(&self, platforms: &[Platform]) -> Vec<Result<SyncStats>> {
        futures::future::join_all(platforms.iter().map(|p| self.run_platform(*p))).await
    }

    async fn run_platform(&self, platform: Platform) -> Result<SyncStats> {
        let coordinator = self.ctx.coordinator(platform)?;
        let mut sync = self.ctx.sync_context(platform, self.cancel.child_token());

        let period_secs = self
            .config
            .interval_secs
            .unwrap_or_else(|| self.ctx.config.poll_interval_secs(platform))
            .max(1);
        tracing::info!(
            %platform,
            interval = %DaemonConfig::format_interval(period_secs),
            partitions = coordinator.partitions().len(),
            known_items = sync.committer.seen().len(),
            "Polling"
        );

        let mut timer = interval(Duration::from_secs(period_secs));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !self.config.update_on_start {
            timer.tick().await;
        }

        let mut stats_timer = interval(self.config.stats_interval);
        stats_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        stats_timer.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = sync.cancel_token().cancelled() => break,
                _ = stats_timer.tick() => {
                    tracing::info!("Statistics: {}", sync.stats);
                    continue;
                }
                _ = timer.tick() => {}
            }

            match coordinator.run_cycle(&mut sync).await {
                Ok(report) => {
                    if report.stored > 0 {
                        tracing::info!(%platform, stored = report.stored, "New items stored");
                    } else {
                        tracing::debug!(%platform, "No new items");
                    }
                }
                Err(CycleError::Transient(e)) => {
                    tracing::warn!(%platform, error = %e, "Cycle failed, retrying next tick");
                }
                Err(CycleError::Fatal(e)) => {
                    tracing::error!(%platform, error = %e, "Stopping platform loop");
                    return Err(SedimentError::Other(e));
                }
            }
        }

        Ok(sync.stats)
    }

    /// Stop the daemon (called externally)
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = sigint.recv() => {},
                    _ = cancel.cancelled() => return,
                }
            }
            _ => {
                tracing::warn!("Could not install signal handlers, falling back to Ctrl-C");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = cancel.cancelled() => return,
                }
            }
        }
    }

    #[cfg(windows)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = cancel.cancelled() => return,
        }
    }

    tracing::info!("Received shutdown signal");
    cancel.cancel();
}

/// What the PID file says about the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Running(u32),
    /// PID file left behind by a process that is gone.
    Stale(u32),
    Stopped,
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonStatus::Running(pid) => write!(f, "Daemon is running (PID: {})", pid),
            DaemonStatus::Stale(pid) => {
                write!(f, "Daemon is not running (stale PID file for {})", pid)
            }
            DaemonStatus::Stopped => f.write_str("Daemon is not running"),
        }
    }
}

fn read_pid(path: &Path) -> Result<Option<u32>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    content
        .trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|_| SedimentError::Other(format!("Invalid PID in {}", path.display())))
}

fn status_at(path: &Path) -> Result<DaemonStatus> {
    Ok(match read_pid(path)? {
        Some(pid) if Daemon::process_exists(pid) => DaemonStatus::Running(pid),
        Some(pid) => DaemonStatus::Stale(pid),
        None => DaemonStatus::Stopped,
    })
}

fn pid_path() -> Result<PathBuf> {
    Daemon::pid_file_path()
        .ok_or_else(|| SedimentError::Config("Could not determine PID file path".into()))
}

#[cfg(unix)]
fn terminate(pid: u32) -> std::io::Result<bool> {
    std::process::Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()
        .map(|s| s.success())
}

#[cfg(windows)]
fn terminate(pid: u32) -> std::io::Result<bool> {
    std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .status()
        .map(|s| s.success())
}

fn stop_at(path: &Path) -> Result<u32> {
    match status_at(path)? {
        DaemonStatus::Running(pid) => {
            if !terminate(pid)? {
                return Err(SedimentError::Other(format!(
                    "Failed to stop daemon (PID {})",
                    pid
                )));
            }
            let _ = fs::remove_file(path);
            Ok(pid)
        }
        DaemonStatus::Stale(pid) => {
            let _ = fs::remove_file(path);
            Err(SedimentError::Other(format!(
                "No daemon is running (removed stale PID file for {})",
                pid
            )))
        }
        DaemonStatus::Stopped => Err(SedimentError::Other(
            "No daemon is running (PID file not found)".into(),
        )),
    }
}

/// Send SIGTERM to the daemon named in the PID file. Returns its PID.
pub fn stop_daemon() -> Result<u32> {
    stop_at(&pid_path()?)
}

pub fn daemon_status() -> Result<DaemonStatus> {
    status_at(&pid_path()?)
}
