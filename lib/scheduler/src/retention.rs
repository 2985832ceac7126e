//! Two-stage retention for firing events.
//!
//! Events start `active`. After `archive_after` they are moved to
//! `archived`; after `remove_after` archived events are deleted. Both ages
//! are measured from `triggered_at`, and the second stage only ever deletes
//! rows the first stage already archived, so an event is never removed
//! while still active.

use crate::error::{RetentionError, StoreError};
use crate::event::EventStatus;
use crate::repository::TriggerRepository;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Age thresholds for the two retention stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    archive_after: Duration,
    remove_after: Duration,
}

impl RetentionPolicy {
    /// Builds a policy.
    ///
    /// # Errors
    ///
    /// Returns an error if either threshold is negative or if
    /// `remove_after` is shorter than `archive_after`.
    pub fn new(archive_after: Duration, remove_after: Duration) -> Result<Self, RetentionError> {
        if archive_after < Duration::zero() || remove_after < Duration::zero() {
            return Err(RetentionError::InvalidPolicy {
                reason: "thresholds must not be negative".to_string(),
            });
        }
        if remove_after < archive_after {
            return Err(RetentionError::InvalidPolicy {
                reason: format!(
                    "remove_after ({}s) must be at least archive_after ({}s)",
                    remove_after.num_seconds(),
                    archive_after.num_seconds()
                ),
            });
        }
        Ok(Self {
            archive_after,
            remove_after,
        })
    }

    /// Builds a policy from whole seconds.
    ///
    /// # Errors
    ///
    /// See [`RetentionPolicy::new`].
    pub fn from_secs(archive_after: i64, remove_after: i64) -> Result<Self, RetentionError> {
        Self::new(
            Duration::seconds(archive_after),
            Duration::seconds(remove_after),
        )
    }

    #[must_use]
    pub fn archive_after(&self) -> Duration {
        self.archive_after
    }

    #[must_use]
    pub fn remove_after(&self) -> Duration {
        self.remove_after
    }

    /// Events triggered at or before this instant are due for archiving.
    #[must_use]
    pub fn archive_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.archive_after
    }

    /// Archived events triggered at or before this instant are due for removal.
    #[must_use]
    pub fn remove_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.remove_after
    }

    /// Informational `(archived_at, deleted_at)` stamps for a new event.
    #[must_use]
    pub fn deadlines(&self, triggered_at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let stamp = |after| {
            triggered_at
                .checked_add_signed(after)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        };
        (stamp(self.archive_after), stamp(self.remove_after))
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            archive_after: Duration::seconds(60),
            remove_after: Duration::seconds(120),
        }
    }
}

/// Rows affected by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    pub archived: u64,
    pub removed: u64,
}

/// Applies a [`RetentionPolicy`] to the event store.
#[derive(Clone)]
pub struct RetentionSweeper {
    repository: Arc<dyn TriggerRepository>,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    #[must_use]
    pub fn new(repository: Arc<dyn TriggerRepository>, policy: RetentionPolicy) -> Self {
        Self { repository, policy }
    }

    #[must_use]
    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Runs both stages against the current time.
    ///
    /// # Errors
    ///
    /// Returns the store error of the first failing stage.
    pub async fn sweep(&self) -> Result<SweepOutcome, StoreError> {
        self.sweep_at(Utc::now()).await
    }

    /// Runs both stages as of `now`: archive, then remove.
    ///
    /// Idempotent for a fixed `now`. If archiving fails the removal stage
    /// is skipped for this pass.
    ///
    /// # Errors
    ///
    /// Returns the store error of the first failing stage.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepOutcome, StoreError> {
        let archived = self
            .repository
            .transition_events(
                EventStatus::Active,
                self.policy.archive_cutoff(now),
                EventStatus::Archived,
            )
            .await?;

        let removed = self
            .repository
            .remove_events(EventStatus::Archived, self.policy.remove_cutoff(now))
            .await?;

        if archived > 0 || removed > 0 {
            tracing::debug!(archived, removed, "retention sweep");
        }

        Ok(SweepOutcome { archived, removed })
    }
}
