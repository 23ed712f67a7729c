use std::cmp::Ordering;

use crate::domain::{compare_ids, Item, Partition, Platform, Strategy};
use crate::sync::commit::CommitOutcome;
use crate::sync::context::SyncContext;
use crate::sync::paginator::{Paginator, StopReason};

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// Nothing usable came out of this cycle; try again next tick.
    #[error("Sync cycle failed: {0}")]
    Transient(String),

    /// The coordinator cannot run at all.
    #[error("Sync cannot continue: {0}")]
    Fatal(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub partitions: usize,
    pub failed: usize,
    /// Partitions not attempted because the platform hit a rate limit.
    pub skipped: usize,
    pub fetched: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub rate_limited: bool,
    pub cancelled: bool,
}

/// One pass of the `Latest` strategy over every partition of a platform.
pub struct SyncCoordinator {
    paginator: Paginator,
    partitions: Vec<Partition>,
    page_size: usize,
}

/// Newest first. Timestamps break ties on id so the order is stable.
fn newest_first(a: &Item, b: &Item) -> Ordering {
    match (a, b) {
        (Item::Message(x), Item::Message(y)) => compare_ids(&y.tweet_id, &x.tweet_id),
        _ => b
            .created_utc()
            .cmp(&a.created_utc())
            .then_with(|| compare_ids(b.id(), a.id())),
    }
}

impl SyncCoordinator {
    pub fn new(paginator: Paginator, partitions: Vec<Partition>, page_size: usize) -> Self {
        Self {
            paginator,
            partitions,
            page_size,
        }
    }

    pub fn platform(&self) -> Platform {
        self.paginator.source().platform()
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub async fn run_cycle(
        &self,
        ctx: &mut SyncContext,
    ) -> std::result::Result<CycleReport, CycleError> {
        if self.partitions.is_empty() {
            return Err(CycleError::Fatal(format!(
                "no {} partitions configured",
                self.platform()
            )));
        }

        let mut report = CycleReport {
            partitions: self.partitions.len(),
            ..Default::default()
        };

        let store = ctx.committer.store().clone();
        let store_reachable = ctx.tracker.load(store.as_ref(), &self.partitions);

        let mut batch: Vec<(Partition, Item)> = Vec::new();
        for (idx, partition) in self.partitions.iter().enumerate() {
            let frontier = ctx.tracker.frontier(partition);
            let page = match self
                .paginator
                .governed_fetch(
                    ctx,
                    partition,
                    Strategy::Latest,
                    None,
                    self.page_size,
                    &frontier,
                )
                .await
            {
                Ok(page) => page,
                Err(StopReason::RateLimited(until)) => {
                    report.rate_limited = true;
                    report.failed += 1;
                    report.skipped = self.partitions.len() - idx - 1;
                    tracing::warn!(
                        platform = %self.platform(),
                        %partition,
                        skipped = report.skipped,
                        until = ?until,
                        "Rate limited, skipping remaining partitions this cycle"
                    );
                    break;
                }
                Err(StopReason::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(reason) => {
                    report.failed += 1;
                    tracing::warn!(%partition, %reason, "Partition fetch failed");
                    continue;
                }
            };

            tracing::debug!(
                %partition,
                %frontier,
                new = page.items.len(),
                reached_frontier = page.reached_frontier,
                "Checked partition"
            );
            report.fetched += page.items.len();
            batch.extend(page.items.into_iter().map(|item| (partition.clone(), item)));
        }

        batch.sort_by(|(_, a), (_, b)| newest_first(a, b));

        for (partition, item) in &batch {
            if ctx.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match ctx.commit(partition, item) {
                Some(CommitOutcome::Stored) => report.stored += 1,
                Some(CommitOutcome::Duplicate) => report.duplicates += 1,
                None => report.errors += 1,
            }
        }
        ctx.stats.record_cycle();

        let attempted = report.partitions - report.skipped;
        let nothing_committed = report.stored + report.duplicates == 0;
        if attempted > 0 && report.failed == attempted && !report.cancelled {
            return Err(CycleError::Transient(format!(
                "all {} {} partitions failed",
                attempted,
                self.platform()
            )));
        }
        if !store_reachable && nothing_committed && !report.cancelled {
            return Err(CycleError::Transient("store unreachable".into()));
        }
        if report.errors > 0 && nothing_committed {
            return Err(CycleError::Transient(format!(
                "store rejected all {} new items",
                report.errors
            )));
        }

        Ok(report)
    }

    /// Run one cycle and reduce it to a count: new items stored, or `-1`
    /// when the cycle failed as a whole.
    pub async fn fetch_and_store(&self, ctx: &mut SyncContext) -> i64 {
        match self.run_cycle(ctx).await {
            Ok(report) => {
                tracing::info!(
                    platform = %self.platform(),
                    partitions = report.partitions,
                    fetched = report.fetched,
                    stored = report.stored,
                    duplicates = report.duplicates,
                    failed = report.failed,
                    "Cycle complete"
                );
                report.stored as i64
            }
            Err(e) => {
                tracing::error!(platform = %self.platform(), error = %e, "Cycle failed");
                -1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::app::SedimentError;
    use crate::domain::Frontier;
    use crate::store::{SqliteStore, Store};
    use crate::sync::governor::RequestGovernor;
    use crate::sync::testing::{
        capturing_sink, post, tweet, FailingStore, FakeSource, FlakyStore, Reply,
    };
    use crate::sync::SyncEvent;

    fn coordinator(source: &Arc<FakeSource>, partitions: Vec<Partition>) -> SyncCoordinator {
        let paginator = Paginator::new(source.clone(), Arc::new(RequestGovernor::unlimited()));
        SyncCoordinator::new(paginator, partitions, 25)
    }

    #[tokio::test]
    async fn test_alpha_frontier_scenario() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store.insert_if_absent(&post("seed", "alpha", 1000)).unwrap();

        let source = Arc::new(FakeSource::new(Platform::Reddit).script(
            "alpha",
            Strategy::Latest,
            vec![Reply::Page(
                vec![
                    post("p1200", "alpha", 1200),
                    post("p1100", "alpha", 1100),
                    post("p999", "alpha", 999),
                    post("p50", "alpha", 50),
                ],
                Some("t3_p50"),
            )],
        ));
        let alpha = Partition::subreddit("alpha");
        let mut ctx = SyncContext::new(Platform::Reddit, store.clone(), CancellationToken::new());

        let stored = coordinator(&source, vec![alpha.clone()])
            .fetch_and_store(&mut ctx)
            .await;

        assert_eq!(stored, 2);
        assert!(store.get_item(Platform::Reddit, "p1200").unwrap().is_some());
        assert!(store.get_item(Platform::Reddit, "p1100").unwrap().is_some());
        assert!(store.get_item(Platform::Reddit, "p999").unwrap().is_none());
        assert_eq!(ctx.tracker.frontier(&alpha), Frontier::Timestamp(1200));
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_quiet_cycle_is_normal() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let source = Arc::new(FakeSource::new(Platform::Reddit));
        let mut ctx = SyncContext::new(Platform::Reddit, store, CancellationToken::new());

        let stored = coordinator(&source, vec![Partition::subreddit("samsung")])
            .fetch_and_store(&mut ctx)
            .await;
        assert_eq!(stored, 0);
        assert_eq!(ctx.stats.cycles, 1);
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let source = Arc::new(
            FakeSource::new(Platform::Reddit)
                .script(
                    "broken",
                    Strategy::Latest,
                    vec![Reply::Fail(SedimentError::Status {
                        status: 503,
                        url: "broken".into(),
                    })],
                )
                .script(
                    "healthy",
                    Strategy::Latest,
                    vec![Reply::Page(vec![post("h1", "healthy", 10)], None)],
                ),
        );
        let mut ctx = SyncContext::new(Platform::Reddit, store.clone(), CancellationToken::new());

        let report = coordinator(
            &source,
            vec![Partition::subreddit("broken"), Partition::subreddit("healthy")],
        )
        .run_cycle(&mut ctx)
        .await
        .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.stored, 1);
        assert_eq!(store.count_items(Platform::Reddit).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_every_partition_failing_is_sentinel() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let fail = || {
            vec![Reply::Fail(SedimentError::Status {
                status: 500,
                url: "x".into(),
            })]
        };
        let source = Arc::new(
            FakeSource::new(Platform::Reddit)
                .script("a", Strategy::Latest, fail())
                .script("b", Strategy::Latest, fail()),
        );
        let mut ctx = SyncContext::new(Platform::Reddit, store, CancellationToken::new());

        let result = coordinator(
            &source,
            vec![Partition::subreddit("a"), Partition::subreddit("b")],
        )
        .fetch_and_store(&mut ctx)
        .await;
        assert_eq!(result, -1);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_sentinel() {
        let source = Arc::new(FakeSource::new(Platform::Reddit).script(
            "samsung",
            Strategy::Latest,
            vec![Reply::Page(vec![post("a", "samsung", 10)], None)],
        ));
        let mut ctx =
            SyncContext::new(Platform::Reddit, Arc::new(FailingStore), CancellationToken::new());

        let result = coordinator(&source, vec![Partition::subreddit("samsung")])
            .fetch_and_store(&mut ctx)
            .await;
        assert_eq!(result, -1);
        assert_eq!(ctx.stats.errors, 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_with_quiet_upstream_is_sentinel() {
        let source = Arc::new(FakeSource::new(Platform::Reddit));
        let mut ctx =
            SyncContext::new(Platform::Reddit, Arc::new(FailingStore), CancellationToken::new());

        let coordinator = coordinator(&source, vec![Partition::subreddit("samsung")]);
        assert!(matches!(
            coordinator.run_cycle(&mut ctx).await,
            Err(CycleError::Transient(_))
        ));
        assert_eq!(coordinator.fetch_and_store(&mut ctx).await, -1);
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_item_store_failure_does_not_stop_the_page() {
        let store = Arc::new(FlakyStore::failing_on(["b"]));
        let source = Arc::new(FakeSource::new(Platform::Reddit).script(
            "samsung",
            Strategy::Latest,
            vec![Reply::Page(
                vec![
                    post("a", "samsung", 40),
                    post("b", "samsung", 30),
                    post("c", "samsung", 20),
                    post("d", "samsung", 10),
                ],
                None,
            )],
        ));
        let (sink, events) = capturing_sink();
        let mut ctx = SyncContext::new(Platform::Reddit, store.clone(), CancellationToken::new())
            .with_sink(sink);

        let report = coordinator(&source, vec![Partition::subreddit("samsung")])
            .run_cycle(&mut ctx)
            .await
            .unwrap();

        assert_eq!(report.stored, 3);
        assert_eq!(report.errors, 1);
        assert_eq!(ctx.stats.errors, 1);
        assert_eq!(store.attempts(), vec!["a", "b", "c", "d"]);
        assert_eq!(store.count_items(Platform::Reddit).unwrap(), 3);
        assert!(events.lock().unwrap().iter().any(|e| matches!(
            e,
            SyncEvent::ItemError { id, .. } if id == "b"
        )));
    }

    #[tokio::test]
    async fn test_rate_limit_skips_remaining_partitions() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let source = Arc::new(
            FakeSource::new(Platform::Twitter)
                .script(
                    "first",
                    Strategy::Latest,
                    vec![Reply::Page(vec![tweet("100", "first")], None)],
                )
                .script(
                    "second",
                    Strategy::Latest,
                    vec![Reply::Fail(SedimentError::RateLimited { reset_at: None })],
                ),
        );
        let partitions = vec![
            Partition::hashtags(["first"]),
            Partition::hashtags(["second"]),
            Partition::hashtags(["third"]),
        ];
        let mut ctx = SyncContext::new(Platform::Twitter, store, CancellationToken::new());

        let report = coordinator(&source, partitions)
            .run_cycle(&mut ctx)
            .await
            .unwrap();

        assert!(report.rate_limited);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.stored, 1);
        assert_eq!(source.call_count(), 2);
        assert_eq!(ctx.stats.rate_limit_hits, 1);
    }

    #[tokio::test]
    async fn test_merges_partitions_newest_first() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let source = Arc::new(
            FakeSource::new(Platform::Reddit)
                .script(
                    "a",
                    Strategy::Latest,
                    vec![Reply::Page(vec![post("a1", "a", 10), post("a2", "a", 30)], None)],
                )
                .script(
                    "b",
                    Strategy::Latest,
                    vec![Reply::Page(vec![post("b1", "b", 20)], None)],
                ),
        );
        let (sink, events) = capturing_sink();
        let mut ctx = SyncContext::new(Platform::Reddit, store, CancellationToken::new())
            .with_sink(sink);

        coordinator(&source, vec![Partition::subreddit("a"), Partition::subreddit("b")])
            .run_cycle(&mut ctx)
            .await
            .unwrap();

        let stored: Vec<String> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SyncEvent::ItemStored { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(stored, vec!["a2", "b1", "a1"]);
    }

    #[tokio::test]
    async fn test_second_cycle_is_idempotent() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let page = || Reply::Page(vec![post("x", "samsung", 10), post("y", "samsung", 20)], None);
        let source = Arc::new(FakeSource::new(Platform::Reddit).script(
            "samsung",
            Strategy::Latest,
            vec![page(), page()],
        ));
        let coordinator = coordinator(&source, vec![Partition::subreddit("samsung")]);

        let mut first = SyncContext::new(Platform::Reddit, store.clone(), CancellationToken::new());
        assert_eq!(coordinator.fetch_and_store(&mut first).await, 2);

        // restart: fresh context, same store
        let mut second =
            SyncContext::new(Platform::Reddit, store.clone(), CancellationToken::new());
        assert_eq!(coordinator.fetch_and_store(&mut second).await, 0);
        assert_eq!(store.count_items(Platform::Reddit).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_no_partitions_is_fatal() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let source = Arc::new(FakeSource::new(Platform::Reddit));
        let mut ctx = SyncContext::new(Platform::Reddit, store, CancellationToken::new());

        let result = coordinator(&source, Vec::new()).run_cycle(&mut ctx).await;
        assert!(matches!(result, Err(CycleError::Fatal(_))));
    }

    #[test]
    fn test_tweets_order_by_id() {
        let a = tweet("1790000000000000002", "k");
        let b = tweet("999", "k");
        assert_eq!(newest_first(&a, &b), Ordering::Less);
    }
}
