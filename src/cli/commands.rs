use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::app::{AppContext, Result, SedimentError};
use crate::config::Config;
use crate::domain::{Partition, Platform};
use crate::store::{PartitionSummary, Store};
use crate::sync::StepOutcome;

fn selected(ctx: &AppContext, platform: Option<Platform>) -> Result<Vec<Platform>> {
    match platform {
        Some(p) if !ctx.config.is_enabled(p) => {
            Err(SedimentError::Config(format!("{} is not enabled", p)))
        }
        Some(p) => Ok(vec![p]),
        None => Ok(ctx.platforms()),
    }
}

/// One cycle per platform, concurrently. Returns the total stored, or `-1`
/// if any platform failed as a whole.
pub async fn sync_once(ctx: &AppContext, platform: Option<Platform>) -> Result<i64> {
    let platforms = selected(ctx, platform)?;
    if platforms.is_empty() {
        println!("No platforms enabled");
        return Ok(0);
    }

    let cancel = CancellationToken::new();
    let runs = platforms.iter().map(|&platform| {
        let cancel = cancel.clone();
        async move {
            let coordinator = ctx.coordinator(platform)?;
            let mut sync = ctx.sync_context(platform, cancel);
            let count = coordinator.fetch_and_store(&mut sync).await;
            Ok::<_, SedimentError>((platform, count))
        }
    });

    let mut total = 0;
    let mut failed = false;
    for result in futures::future::join_all(runs).await {
        let (platform, count) = result?;
        if count < 0 {
            eprintln!("  ! {}: sync failed", platform);
            failed = true;
        } else {
            println!("  {}: {} new items", platform, count);
            total += count;
        }
    }

    if failed {
        return Ok(-1);
    }
    println!("Sync complete: {} new items", total);
    Ok(total)
}

fn partition_for(platform: Platform, target: &str) -> Partition {
    match platform {
        Platform::Reddit => Partition::subreddit(target),
        Platform::Twitter => Partition::hashtags(target.split(',')),
    }
}

fn summary_for(ctx: &AppContext, partition: &Partition) -> Result<Option<PartitionSummary>> {
    Ok(ctx
        .store
        .partition_summaries(partition.platform)?
        .into_iter()
        .find(|s| &s.partition == partition))
}

fn print_summary(label: &str, summary: Option<&PartitionSummary>) {
    match summary {
        Some(s) => println!(
            "{}: {} items, {} .. {}",
            label,
            s.count,
            s.earliest
                .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
            s.latest
                .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default()
        ),
        None => println!("{}: no items", label),
    }
}

pub async fn backfill(
    ctx: &AppContext,
    platform: Platform,
    target: &str,
    budget: Option<usize>,
) -> Result<()> {
    let partition = partition_for(platform, target);
    if partition.key.is_empty() {
        return Err(SedimentError::Config(format!(
            "Nothing to backfill for {:?}",
            target
        )));
    }

    let orchestrator = ctx.backfill(platform)?;
    let budget = budget.unwrap_or(ctx.config.backfill.budget);

    print_summary("Before", summary_for(ctx, &partition)?.as_ref());
    println!("Backfilling {} (base budget {})", partition, budget);

    let mut sync = ctx.sync_context(platform, CancellationToken::new());
    let report = orchestrator.run(&partition, budget, &mut sync).await;

    if report.skipped_existing {
        println!("{} already has data, skipped (only_if_empty)", partition);
        return Ok(());
    }

    for step in &report.steps {
        match &step.outcome {
            StepOutcome::Walked(walk) => println!(
                "  {:<10} budget {:>5}: {} fetched, {} new, {} duplicates ({})",
                step.strategy.to_string(),
                step.budget,
                walk.fetched,
                walk.stored,
                walk.duplicates,
                walk.stop
            ),
            StepOutcome::Unsupported => {
                println!("  {:<10} unsupported on {}", step.strategy.to_string(), platform)
            }
            StepOutcome::Skipped => println!("  {:<10} skipped", step.strategy.to_string()),
        }
    }

    println!(
        "Backfill complete: {} fetched, {} new, {} duplicates, {} errors",
        report.fetched(),
        report.stored(),
        report.duplicates(),
        report.errors()
    );
    print_summary("After", summary_for(ctx, &partition)?.as_ref());
    Ok(())
}

pub fn show_stats(ctx: &AppContext, platform: Option<Platform>) -> Result<()> {
    let platforms = match platform {
        Some(p) => vec![p],
        None => Platform::ALL.to_vec(),
    };

    for platform in platforms {
        let total = ctx.store.count_items(platform)?;
        println!("{} ({} items)", platform, total);

        let summaries = ctx.store.partition_summaries(platform)?;
        if summaries.is_empty() {
            println!("  No items");
            continue;
        }
        for s in summaries {
            print_summary(&format!("  {}", s.partition), Some(&s));
        }
    }

    Ok(())
}

/// Minimal request per enabled platform. Returns whether all succeeded.
pub async fn check(ctx: &AppContext) -> Result<bool> {
    let mut healthy = true;

    for platform in ctx.platforms() {
        let Some(partition) = ctx.config.partitions(platform).into_iter().next() else {
            println!("  ! {}: no partitions configured", platform);
            healthy = false;
            continue;
        };

        let paginator = ctx.paginator(platform)?;
        match paginator.source().check(&partition).await {
            Ok(n) => println!("  + {}: OK ({} items from {})", platform, n, partition),
            Err(e) => {
                eprintln!("  ! {}: {}", platform, e);
                healthy = false;
            }
        }
    }

    Ok(healthy)
}

pub fn init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::default_config_path().map_err(|e| SedimentError::Config(e.to_string()))?,
    };

    if path.exists() && !force {
        println!("Config already exists: {} (use --force to overwrite)", path.display());
        return Ok(());
    }

    Config::create_default_config(&path).map_err(|e| SedimentError::Config(e.to_string()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::Strategy;
    use crate::sync::testing::{post, FakeSource, Reply};

    fn context(source: FakeSource) -> AppContext {
        let mut config = Config::default();
        config.reddit.subreddits = vec!["samsung".into()];
        config.reddit.request_delay_ms = 0;
        AppContext::in_memory(config)
            .unwrap()
            .with_source(Arc::new(source))
    }

    #[tokio::test]
    async fn test_sync_once_counts_new_items() {
        let ctx = context(FakeSource::new(Platform::Reddit).script(
            "samsung",
            Strategy::Latest,
            vec![Reply::Page(
                vec![post("a", "samsung", 10), post("b", "samsung", 20)],
                None,
            )],
        ));

        assert_eq!(sync_once(&ctx, None).await.unwrap(), 2);
        assert!(sync_once(&ctx, Some(Platform::Twitter)).await.is_err());
    }

    #[tokio::test]
    async fn test_sync_once_reports_failure() {
        let ctx = context(FakeSource::new(Platform::Reddit).script(
            "samsung",
            Strategy::Latest,
            vec![Reply::Fail(SedimentError::Status {
                status: 503,
                url: "x".into(),
            })],
        ));
        assert_eq!(sync_once(&ctx, None).await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_backfill_and_stats() {
        let ctx = context(FakeSource::new(Platform::Reddit).script(
            "samsung",
            Strategy::TopAllTime,
            vec![Reply::Page(vec![post("old", "samsung", 10)], None)],
        ));

        backfill(&ctx, Platform::Reddit, "r/Samsung", Some(10))
            .await
            .unwrap();
        assert_eq!(ctx.store.count_items(Platform::Reddit).unwrap(), 1);
        show_stats(&ctx, None).unwrap();
    }

    #[tokio::test]
    async fn test_check_uses_first_partition() {
        let source = FakeSource::new(Platform::Reddit);
        let ctx = context(source);
        assert!(check(&ctx).await.unwrap());
    }

    #[test]
    fn test_init_config_respects_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        init_config(Some(&path), false).unwrap();
        std::fs::write(&path, "log_level = \"debug\"\n").unwrap();

        init_config(Some(&path), false).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "log_level = \"debug\"\n"
        );

        init_config(Some(&path), true).unwrap();
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("[backfill]"));
    }
}
