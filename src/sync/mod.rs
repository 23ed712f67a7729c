//! The incremental ingestion engine.
//!
//! ```text
//! SyncCoordinator / BackfillOrchestrator
//!         │ frontier            ┌──────────────────┐
//!         ├──────────────────►  │ PartitionTracker │
//!         │ pages               └──────────────────┘
//!         ├──► Paginator ──► RequestGovernor ──► Source
//!         │ items
//!         └──► Committer ──► Store
//! ```
//!
//! Everything a run mutates lives in a caller-owned [`SyncContext`].

pub mod backfill;
pub mod commit;
pub mod context;
pub mod cycle;
pub mod governor;
pub mod paginator;
pub mod tracker;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{Partition, Platform, Strategy};

pub use backfill::{BackfillOrchestrator, BackfillReport, StepOutcome};
pub use commit::{CommitOutcome, Committer, SessionDedupSet};
pub use context::SyncContext;
pub use cycle::{CycleError, CycleReport, SyncCoordinator};
pub use governor::{Acquire, RequestGovernor};
pub use paginator::{Page, Paginator, StopReason, WalkReport};
pub use tracker::PartitionTracker;

/// Observable milestones of a sync run.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SyncEvent {
    FetchAttempted {
        partition: Partition,
        strategy: Strategy,
        cursor: Option<String>,
    },
    PageFetched {
        partition: Partition,
        strategy: Strategy,
        count: usize,
        reached_frontier: bool,
    },
    ItemStored {
        partition: Partition,
        id: String,
        headline: String,
    },
    ItemDuplicate {
        partition: Partition,
        id: String,
    },
    ItemError {
        partition: Partition,
        id: String,
        error: String,
    },
    StrategyExhausted {
        partition: Partition,
        strategy: Strategy,
        reason: StopReason,
    },
    RateLimited {
        platform: Platform,
        reset_at: Option<DateTime<Utc>>,
    },
}

pub type EventSink = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// The default sink: every event becomes a `tracing` record.
pub fn tracing_sink() -> EventSink {
    Arc::new(log_event)
}

/// A sink that drops every event.
pub fn null_sink() -> EventSink {
    Arc::new(|_| {})
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::FetchAttempted {
            partition,
            strategy,
            cursor,
        } => {
            tracing::debug!(%partition, %strategy, cursor = cursor.as_deref(), "Fetching page");
        }
        SyncEvent::PageFetched {
            partition,
            strategy,
            count,
            reached_frontier,
        } => {
            tracing::debug!(%partition, %strategy, count, reached_frontier, "Fetched page");
        }
        SyncEvent::ItemStored {
            partition,
            id,
            headline,
        } => {
            tracing::info!(%partition, id, "New: {}", headline);
        }
        SyncEvent::ItemDuplicate { partition, id } => {
            tracing::trace!(%partition, id, "Already stored");
        }
        SyncEvent::ItemError {
            partition,
            id,
            error,
        } => {
            tracing::warn!(%partition, id, error, "Failed to store item");
        }
        SyncEvent::StrategyExhausted {
            partition,
            strategy,
            reason,
        } => {
            tracing::debug!(%partition, %strategy, %reason, "Strategy finished");
        }
        SyncEvent::RateLimited { platform, reset_at } => match reset_at {
            Some(at) => tracing::warn!(%platform, reset_at = %at, "Rate limited"),
            None => tracing::warn!(%platform, "Rate limited"),
        },
    }
}
