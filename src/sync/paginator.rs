use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::app::{Result, SedimentError};
use crate::domain::{Frontier, Item, Partition, Strategy};
use crate::source::Source;
use crate::sync::commit::CommitOutcome;
use crate::sync::context::SyncContext;
use crate::sync::governor::{Acquire, RequestGovernor};
use crate::sync::SyncEvent;

/// One upstream page after frontier filtering.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Item>,
    pub next_cursor: Option<String>,
    /// An item at or behind the frontier was seen on this page.
    pub reached_frontier: bool,
}

/// Why a walk stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// Empty page or no further cursor.
    Exhausted,
    BudgetSpent,
    FrontierReached,
    RateLimited(Option<DateTime<Utc>>),
    Cancelled,
    Unsupported,
    Failed(String),
}

impl StopReason {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, StopReason::RateLimited(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::Failed(_))
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Exhausted => f.write_str("exhausted"),
            StopReason::BudgetSpent => f.write_str("budget spent"),
            StopReason::FrontierReached => f.write_str("frontier reached"),
            StopReason::RateLimited(Some(at)) => {
                write!(f, "rate limited until {}", at.format("%H:%M:%S UTC"))
            }
            StopReason::RateLimited(None) => f.write_str("rate limited"),
            StopReason::Cancelled => f.write_str("cancelled"),
            StopReason::Unsupported => f.write_str("unsupported"),
            StopReason::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalkReport {
    pub partition: Partition,
    pub strategy: Strategy,
    pub pages: usize,
    pub fetched: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub stop: StopReason,
}

impl WalkReport {
    fn new(partition: &Partition, strategy: Strategy) -> Self {
        Self {
            partition: partition.clone(),
            strategy,
            pages: 0,
            fetched: 0,
            stored: 0,
            duplicates: 0,
            errors: 0,
            stop: StopReason::Exhausted,
        }
    }

    fn tally(&mut self, outcome: Option<CommitOutcome>) {
        match outcome {
            Some(CommitOutcome::Stored) => self.stored += 1,
            Some(CommitOutcome::Duplicate) => self.duplicates += 1,
            None => self.errors += 1,
        }
    }
}

/// Walks one source's cursor sequence, one governed request at a time.
#[derive(Clone)]
pub struct Paginator {
    source: Arc<dyn Source>,
    governor: Arc<RequestGovernor>,
}

impl Paginator {
    pub fn new(source: Arc<dyn Source>, governor: Arc<RequestGovernor>) -> Self {
        Self { source, governor }
    }

    pub fn source(&self) -> &dyn Source {
        self.source.as_ref()
    }

    pub fn governor(&self) -> &RequestGovernor {
        &self.governor
    }

    /// Fetch and filter one page.
    ///
    /// For `Latest`, only items strictly newer than `frontier` are kept and
    /// every item on the page is examined, since upstream ordering is not
    /// exact near the boundary. Parse failures degrade to an empty page.
    pub async fn fetch_page(
        &self,
        partition: &Partition,
        strategy: Strategy,
        cursor: Option<&str>,
        page_size: usize,
        frontier: &Frontier,
    ) -> Result<Page> {
        let page_size = self.source.clamp_page_size(page_size);
        let listing = match self
            .source
            .fetch_page(partition, strategy, cursor, page_size, frontier)
            .await
        {
            Ok(listing) => listing,
            Err(SedimentError::Parse(e)) => {
                tracing::warn!(%partition, %strategy, error = %e, "Unparsable page, treating as empty");
                return Ok(Page::default());
            }
            Err(SedimentError::RateLimited { reset_at }) => {
                let until = self.governor.note_rate_limited(reset_at);
                return Err(SedimentError::RateLimited {
                    reset_at: Some(until),
                });
            }
            Err(e) => return Err(e),
        };

        let mut items = listing.items;
        let mut reached_frontier = false;
        if strategy == Strategy::Latest && !frontier.is_empty() {
            let before = items.len();
            items.retain(|item| frontier.admits(item));
            reached_frontier = items.len() < before;
        }

        Ok(Page {
            items,
            next_cursor: listing.next_cursor,
            reached_frontier,
        })
    }

    /// `fetch_page` behind the governor and the cancellation token.
    pub async fn governed_fetch(
        &self,
        ctx: &mut SyncContext,
        partition: &Partition,
        strategy: Strategy,
        cursor: Option<&str>,
        page_size: usize,
        frontier: &Frontier,
    ) -> std::result::Result<Page, StopReason> {
        if !self.source.supports(strategy) {
            return Err(StopReason::Unsupported);
        }

        match self.governor.acquire(ctx.cancel_token()).await {
            Acquire::Ready => {}
            Acquire::Cancelled => return Err(StopReason::Cancelled),
            Acquire::CoolingDown(until) => return Err(StopReason::RateLimited(Some(until))),
        }

        ctx.emit(SyncEvent::FetchAttempted {
            partition: partition.clone(),
            strategy,
            cursor: cursor.map(str::to_string),
        });

        let cancel = ctx.cancel_token().clone();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StopReason::Cancelled),
            result = self.fetch_page(partition, strategy, cursor, page_size, frontier) => result,
        };

        match result {
            Ok(page) => {
                ctx.stats.record_fetch(page.items.len());
                ctx.emit(SyncEvent::PageFetched {
                    partition: partition.clone(),
                    strategy,
                    count: page.items.len(),
                    reached_frontier: page.reached_frontier,
                });
                Ok(page)
            }
            Err(SedimentError::RateLimited { reset_at }) => {
                ctx.stats.record_rate_limit();
                ctx.emit(SyncEvent::RateLimited {
                    platform: self.source.platform(),
                    reset_at,
                });
                Err(StopReason::RateLimited(reset_at))
            }
            Err(e) => {
                ctx.stats.record_error();
                tracing::warn!(%partition, %strategy, error = %e, "Page fetch failed");
                Err(StopReason::Failed(e.to_string()))
            }
        }
    }

    /// Follow cursors from the first page until exhaustion, `budget` items,
    /// the frontier (`Latest` only), a rate limit or cancellation. Every
    /// surviving item is committed through `ctx`.
    pub async fn walk(
        &self,
        ctx: &mut SyncContext,
        partition: &Partition,
        strategy: Strategy,
        budget: usize,
        page_size: usize,
    ) -> WalkReport {
        let frontier = if strategy == Strategy::Latest {
            ctx.tracker.frontier(partition)
        } else {
            Frontier::Empty
        };

        let mut report = WalkReport::new(partition, strategy);
        let mut cursor: Option<String> = None;

        report.stop = loop {
            if report.fetched >= budget {
                break StopReason::BudgetSpent;
            }
            let remaining = budget - report.fetched;

            let page = match self
                .governed_fetch(
                    ctx,
                    partition,
                    strategy,
                    cursor.as_deref(),
                    page_size.min(remaining),
                    &frontier,
                )
                .await
            {
                Ok(page) => page,
                Err(reason) => break reason,
            };
            report.pages += 1;

            if page.items.is_empty() && !page.reached_frontier {
                break StopReason::Exhausted;
            }

            let mut cancelled = false;
            for item in page.items.iter().take(remaining) {
                if ctx.is_cancelled() {
                    cancelled = true;
                    break;
                }
                report.fetched += 1;
                let outcome = ctx.commit(partition, item);
                report.tally(outcome);
            }
            if cancelled {
                break StopReason::Cancelled;
            }
            if page.reached_frontier {
                break StopReason::FrontierReached;
            }

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break StopReason::Exhausted,
            }
        };

        ctx.emit(SyncEvent::StrategyExhausted {
            partition: partition.clone(),
            strategy,
            reason: report.stop.clone(),
        });
        report
    }
}
