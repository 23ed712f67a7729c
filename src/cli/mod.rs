pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::Platform;

#[derive(Parser)]
#[command(name = "sediment")]
#[command(about = "Incremental Reddit and X ingestion into SQLite", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/sediment/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overrides [store] path
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one sync cycle for each enabled platform
    Sync {
        /// Only sync this platform (reddit, twitter)
        #[arg(short, long)]
        platform: Option<Platform>,
    },
    /// Historical backfill of one partition using the configured plan
    Backfill {
        /// Subreddit name, or comma separated hashtags with --platform twitter
        target: String,

        /// Platform the target belongs to
        #[arg(short, long, default_value = "reddit")]
        platform: Platform,

        /// Base item budget (default: [backfill] budget)
        #[arg(short, long)]
        budget: Option<usize>,
    },
    /// Show per-partition item counts and time ranges
    Stats {
        /// Only show this platform
        #[arg(short, long)]
        platform: Option<Platform>,
    },
    /// Check connectivity to each enabled platform
    Check,
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Background daemon for continuous polling
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Subcommand)]
pub enum DaemonAction {
    /// Start polling in the foreground
    Start {
        /// Poll interval for every platform (e.g., "30s", "5m", "1h")
        #[arg(short, long)]
        interval: Option<String>,

        /// Skip the immediate first cycle
        #[arg(long)]
        no_initial_update: bool,

        /// Also write logs to this file
        #[arg(short, long)]
        log: Option<PathBuf>,
    },
    /// Stop the running daemon
    Stop,
    /// Check daemon status
    Status,
}
