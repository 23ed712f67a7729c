use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sediment::app::AppContext;
use sediment::cli::{commands, Cli, Commands, DaemonAction};
use sediment::config::Config;
use sediment::daemon::{self, Daemon, DaemonConfig};

/// `RUST_LOG` wins over the configured level; `log_file` gets a plain copy.
fn init_tracing(level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(file_layer)
        .with(filter)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // commands that don't need a loaded config
    match &cli.command {
        Commands::InitConfig { force } => {
            commands::init_config(cli.config.as_deref(), *force)?;
            return Ok(());
        }
        Commands::Daemon {
            action: DaemonAction::Stop,
        } => {
            let pid = daemon::stop_daemon()?;
            println!("Daemon stopped (PID {})", pid);
            return Ok(());
        }
        Commands::Daemon {
            action: DaemonAction::Status,
        } => {
            println!("{}", daemon::daemon_status()?);
            return Ok(());
        }
        _ => {}
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.store.path = Some(db);
    }

    let log_file = match &cli.command {
        Commands::Daemon {
            action: DaemonAction::Start { log, .. },
        } => log.clone(),
        _ => None,
    };
    init_tracing(&config.log_level, log_file.as_deref())?;

    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Sync { platform } => {
            if commands::sync_once(&ctx, platform).await? < 0 {
                anyhow::bail!("sync failed");
            }
        }
        Commands::Backfill {
            target,
            platform,
            budget,
        } => {
            commands::backfill(&ctx, platform, &target, budget).await?;
        }
        Commands::Stats { platform } => {
            commands::show_stats(&ctx, platform)?;
        }
        Commands::Check => {
            if !commands::check(&ctx).await? {
                anyhow::bail!("connectivity check failed");
            }
        }
        Commands::Daemon {
            action:
                DaemonAction::Start {
                    interval,
                    no_initial_update,
                    ..
                },
        } => {
            let interval_secs = interval
                .as_deref()
                .map(DaemonConfig::parse_poll_interval)
                .transpose()
                .map_err(anyhow::Error::msg)?;

            let daemon_config = DaemonConfig {
                interval_secs,
                update_on_start: !no_initial_update,
                ..Default::default()
            };
            Daemon::new(Arc::new(ctx), daemon_config).run().await?;
        }
        Commands::InitConfig { .. }
        | Commands::Daemon {
            action: DaemonAction::Stop | DaemonAction::Status,
        } => unreachable!("handled before config load"),
    }

    Ok(())
}
