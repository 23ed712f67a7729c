use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::domain::{Item, Partition, Platform, SyncStats};
use crate::store::Store;
use crate::sync::commit::{CommitOutcome, Committer};
use crate::sync::tracker::PartitionTracker;
use crate::sync::{tracing_sink, EventSink, SyncEvent};

/// Everything one platform's sync run reads and mutates.
///
/// Owned by the caller (daemon loop, CLI command or test) and passed by
/// `&mut` into the coordinator and orchestrator.
pub struct SyncContext {
    pub platform: Platform,
    pub tracker: PartitionTracker,
    pub committer: Committer,
    pub stats: SyncStats,
    cancel: CancellationToken,
    sink: EventSink,
}

impl SyncContext {
    pub fn new(platform: Platform, store: Arc<dyn Store>, cancel: CancellationToken) -> Self {
        Self {
            platform,
            tracker: PartitionTracker::new(),
            committer: Committer::new(store, platform),
            stats: SyncStats::new(platform),
            cancel,
            sink: tracing_sink(),
        }
    }

    pub fn with_sink(mut self, sink: EventSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn store(&self) -> &dyn Store {
        self.committer.store().as_ref()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn emit(&self, event: SyncEvent) {
        (self.sink)(&event);
    }

    /// Commit one item and account for it: stats, events and, when stored,
    /// the partition frontier. Store errors are absorbed here.
    pub fn commit(&mut self, partition: &Partition, item: &Item) -> Option<CommitOutcome> {
        match self.committer.commit(item) {
            Ok(CommitOutcome::Stored) => {
                let marker = item.marker();
                self.stats.record_stored(marker.clone());
                self.tracker.advance(partition, marker);
                self.emit(SyncEvent::ItemStored {
                    partition: partition.clone(),
                    id: item.id().to_string(),
                    headline: item.headline(),
                });
                Some(CommitOutcome::Stored)
            }
            Ok(CommitOutcome::Duplicate) => {
                self.stats.record_duplicate();
                self.emit(SyncEvent::ItemDuplicate {
                    partition: partition.clone(),
                    id: item.id().to_string(),
                });
                Some(CommitOutcome::Duplicate)
            }
            Err(e) => {
                self.stats.record_error();
                self.emit(SyncEvent::ItemError {
                    partition: partition.clone(),
                    id: item.id().to_string(),
                    error: e.to_string(),
                });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Frontier;
    use crate::store::SqliteStore;
    use crate::sync::testing::{capturing_sink, post, FailingStore};

    #[test]
    fn test_commit_accounts_for_outcomes() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let (sink, events) = capturing_sink();
        let mut ctx = SyncContext::new(Platform::Reddit, store, CancellationToken::new())
            .with_sink(sink);
        let samsung = Partition::subreddit("samsung");

        let item = post("a", "samsung", 1200);
        assert_eq!(ctx.commit(&samsung, &item), Some(CommitOutcome::Stored));
        assert_eq!(ctx.commit(&samsung, &item), Some(CommitOutcome::Duplicate));

        assert_eq!(ctx.stats.items_stored, 1);
        assert_eq!(ctx.stats.duplicates, 1);
        assert_eq!(ctx.stats.latest_marker, Frontier::Timestamp(1200));
        assert_eq!(ctx.tracker.frontier(&samsung), Frontier::Timestamp(1200));

        let events = events.lock().unwrap();
        assert!(matches!(events[0], SyncEvent::ItemStored { .. }));
        assert!(matches!(events[1], SyncEvent::ItemDuplicate { .. }));
    }

    #[test]
    fn test_newest_first_commits_keep_newest_marker() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let mut ctx = SyncContext::new(Platform::Reddit, store, CancellationToken::new());
        let samsung = Partition::subreddit("samsung");

        ctx.commit(&samsung, &post("p1200", "samsung", 1200));
        ctx.commit(&samsung, &post("p1100", "samsung", 1100));

        assert_eq!(ctx.stats.items_stored, 2);
        assert_eq!(ctx.stats.latest_marker.to_string(), "ts:1200");
        assert_eq!(ctx.tracker.frontier(&samsung), Frontier::Timestamp(1200));
    }

    #[test]
    fn test_store_error_is_counted_not_raised() {
        let mut ctx = SyncContext::new(
            Platform::Reddit,
            Arc::new(FailingStore),
            CancellationToken::new(),
        );
        let samsung = Partition::subreddit("samsung");

        assert_eq!(ctx.commit(&samsung, &post("a", "samsung", 5)), None);
        assert_eq!(ctx.stats.errors, 1);
        assert_eq!(ctx.tracker.frontier(&samsung), Frontier::Empty);
    }
}
