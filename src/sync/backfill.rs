use crate::domain::{Partition, PlanStep, Strategy};
use crate::sync::context::SyncContext;
use crate::sync::paginator::{Paginator, StopReason, WalkReport};

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Walked(WalkReport),
    Unsupported,
    /// Not attempted because an earlier step hit a rate limit or the run
    /// was cancelled.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub strategy: Strategy,
    pub budget: usize,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackfillReport {
    pub partition: Partition,
    pub steps: Vec<StepReport>,
    /// Set when `only_if_empty` found existing data and nothing ran.
    pub skipped_existing: bool,
}

impl BackfillReport {
    fn walks(&self) -> impl Iterator<Item = &WalkReport> {
        self.steps.iter().filter_map(|s| match &s.outcome {
            StepOutcome::Walked(w) => Some(w),
            _ => None,
        })
    }

    pub fn fetched(&self) -> usize {
        self.walks().map(|w| w.fetched).sum()
    }

    pub fn stored(&self) -> usize {
        self.walks().map(|w| w.stored).sum()
    }

    pub fn duplicates(&self) -> usize {
        self.walks().map(|w| w.duplicates).sum()
    }

    pub fn errors(&self) -> usize {
        self.walks().map(|w| w.errors).sum()
    }

    pub fn rate_limited(&self) -> bool {
        self.walks().any(|w| w.stop.is_rate_limited())
    }
}

/// Runs overlapping ranking strategies one after another, each with its own
/// share of the base budget. Overlap is expected; the commit layer turns
/// repeats into duplicates.
pub struct BackfillOrchestrator {
    paginator: Paginator,
    plan: Vec<PlanStep>,
    only_if_empty: bool,
    page_size: usize,
}

impl BackfillOrchestrator {
    pub fn new(paginator: Paginator, plan: Vec<PlanStep>) -> Self {
        Self {
            paginator,
            plan,
            only_if_empty: false,
            page_size: 100,
        }
    }

    pub fn only_if_empty(mut self, only_if_empty: bool) -> Self {
        self.only_if_empty = only_if_empty;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn plan(&self) -> &[PlanStep] {
        &self.plan
    }

    pub async fn run(
        &self,
        partition: &Partition,
        base_budget: usize,
        ctx: &mut SyncContext,
    ) -> BackfillReport {
        let mut report = BackfillReport {
            partition: partition.clone(),
            steps: Vec::with_capacity(self.plan.len()),
            skipped_existing: false,
        };

        if self.only_if_empty {
            let store = ctx.committer.store().clone();
            ctx.tracker
                .load(store.as_ref(), std::slice::from_ref(partition));
            let frontier = ctx.tracker.frontier(partition);
            if !frontier.is_empty() {
                tracing::info!(%partition, %frontier, "Partition already has data, skipping backfill");
                report.skipped_existing = true;
                return report;
            }
        }

        tracing::info!(%partition, base_budget, steps = self.plan.len(), "Starting backfill");

        let mut halted = false;
        for step in &self.plan {
            let budget = step.budget(base_budget);
            let outcome = if halted {
                StepOutcome::Skipped
            } else if !self.paginator.source().supports(step.strategy) {
                tracing::debug!(%partition, strategy = %step.strategy, "Strategy unsupported, skipping");
                StepOutcome::Unsupported
            } else if budget == 0 {
                StepOutcome::Skipped
            } else {
                let walk = self
                    .paginator
                    .walk(ctx, partition, step.strategy, budget, self.page_size)
                    .await;

                match &walk.stop {
                    StopReason::RateLimited(_) | StopReason::Cancelled => halted = true,
                    StopReason::Failed(e) => {
                        tracing::warn!(%partition, strategy = %step.strategy, error = %e, "Strategy failed, moving on");
                    }
                    _ => {}
                }
                tracing::info!(
                    %partition,
                    strategy = %step.strategy,
                    fetched = walk.fetched,
                    stored = walk.stored,
                    duplicates = walk.duplicates,
                    stop = %walk.stop,
                    "Strategy complete"
                );
                StepOutcome::Walked(walk)
            };

            report.steps.push(StepReport {
                strategy: step.strategy,
                budget,
                outcome,
            });
        }

        tracing::info!(
            %partition,
            fetched = report.fetched(),
            stored = report.stored(),
            duplicates = report.duplicates(),
            "Backfill complete"
        );
        report
    }
}
