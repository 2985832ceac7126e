//! Records firings: one event row plus the trigger's state transition.

use crate::error::LogError;
use crate::event::TriggerEvent;
use crate::repository::TriggerRepository;
use crate::retention::RetentionPolicy;
use crate::trigger::truncate_to_minute;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tripwire_core::TriggerId;

/// Turns "trigger X fired" into durable state.
#[derive(Clone)]
pub struct EventLogger {
    repository: Arc<dyn TriggerRepository>,
    retention: RetentionPolicy,
}

impl EventLogger {
    #[must_use]
    pub fn new(repository: Arc<dyn TriggerRepository>, retention: RetentionPolicy) -> Self {
        Self {
            repository,
            retention,
        }
    }

    /// Records a firing of `id` as of now.
    ///
    /// # Errors
    ///
    /// See [`EventLogger::log_firing_at`].
    pub async fn log_firing(&self, id: TriggerId) -> Result<TriggerEvent, LogError> {
        self.log_firing_at(id, Utc::now()).await
    }

    /// Records a firing of `id` in the minute containing `now`.
    ///
    /// The event insert and trigger update commit together. A recurring
    /// trigger is re-armed one interval after the firing minute; a one-shot
    /// trigger becomes inactive.
    ///
    /// # Errors
    ///
    /// - `TriggerNotFound` if the trigger does not exist
    /// - `TriggerInactive` if it no longer accepts firings
    /// - `RearmOutOfRange` if the next `trigger_time` is not representable
    /// - `Store` if the write failed, including losing a race with a
    ///   concurrent firing or update
    pub async fn log_firing_at(
        &self,
        id: TriggerId,
        now: DateTime<Utc>,
    ) -> Result<TriggerEvent, LogError> {
        let trigger = self.repository.get(id).await?;
        if !trigger.is_active() {
            return Err(LogError::TriggerInactive { id });
        }

        let firing = trigger.fire(truncate_to_minute(now), &self.retention)?;
        let event = self.repository.record_firing(firing).await?;

        tracing::info!(
            trigger_id = %id,
            event_id = %event.id,
            trigger_count = event.trigger_count,
            "recorded trigger firing"
        );
        Ok(event)
    }
}
