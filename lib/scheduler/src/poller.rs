//! The minute-aligned polling loop.
//!
//! Once per wall-clock minute, on the `:00` second, the scheduler reads
//! every due trigger, publishes each one, and then runs a retention sweep.
//! Publishing does not advance a trigger; only a recorded firing does. A
//! publish that fails is not retried, and because due-ness is an exact
//! minute match the trigger is not selected again on later passes.

use crate::publisher::EventPublisher;
use crate::repository::TriggerRepository;
use crate::retention::{RetentionSweeper, SweepOutcome};
use crate::trigger::{next_minute_boundary, truncate_to_minute};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// What one pass of the scheduler did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// The minute this pass ran for.
    pub minute: Option<DateTime<Utc>>,
    pub due: usize,
    pub published: usize,
    pub publish_failures: usize,
    /// `None` if the due-trigger query or the sweep failed.
    pub sweep: Option<SweepOutcome>,
    /// True if the due-trigger query failed and nothing was published.
    pub query_failed: bool,
}

/// Drives the publish-then-sweep cycle.
pub struct TriggerScheduler {
    repository: Arc<dyn TriggerRepository>,
    publisher: Arc<dyn EventPublisher>,
    sweeper: RetentionSweeper,
}

impl TriggerScheduler {
    #[must_use]
    pub fn new(
        repository: Arc<dyn TriggerRepository>,
        publisher: Arc<dyn EventPublisher>,
        sweeper: RetentionSweeper,
    ) -> Self {
        Self {
            repository,
            publisher,
            sweeper,
        }
    }

    /// Runs forever, one pass per minute boundary.
    ///
    /// The first pass happens at the first boundary after startup. If the
    /// process falls behind (a pass takes longer than a minute, or the host
    /// was suspended) the missed boundaries are skipped, not replayed.
    pub async fn run(&self) {
        tracing::info!("trigger scheduler started");
        loop {
            let boundary = next_minute_boundary(Utc::now());
            let wait = (boundary - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            let now = Utc::now().max(boundary);
            let report = self.run_cycle(now).await;
            tracing::info!(
                due = report.due,
                published = report.published,
                publish_failures = report.publish_failures,
                archived = report.sweep.map_or(0, |s| s.archived),
                removed = report.sweep.map_or(0, |s| s.removed),
                "scheduler cycle complete"
            );
        }
    }

    /// One pass as of `now`: publish every due trigger, then sweep.
    ///
    /// A failing publish is logged and counted; the remaining triggers are
    /// still attempted. If the due-trigger query fails the pass ends early
    /// without sweeping.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let minute = truncate_to_minute(now);
        let mut report = CycleReport {
            minute: Some(minute),
            ..CycleReport::default()
        };

        let due = match self.repository.find_due(now).await {
            Ok(due) => due,
            Err(e) => {
                tracing::warn!(error = %e, %minute, "failed to query due triggers");
                report.query_failed = true;
                return report;
            }
        };
        report.due = due.len();

        for trigger in &due {
            match self.publisher.publish(trigger).await {
                Ok(()) => {
                    tracing::debug!(trigger_id = %trigger.id, "published due trigger");
                    report.published += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, trigger_id = %trigger.id, "failed to publish trigger");
                    report.publish_failures += 1;
                }
            }
        }

        match self.sweeper.sweep_at(now).await {
            Ok(outcome) => report.sweep = Some(outcome),
            Err(e) => tracing::warn!(error = %e, "retention sweep failed"),
        }

        report
    }
}
