//! Deciding what to do with each delivered firing message.
//!
//! The subscriber hands every message body to a [`Dispatcher`], which asks
//! a [`FiringRecorder`] to record the firing and maps the outcome to a
//! [`Disposition`]. Keeping the decision separate from the broker makes
//! redelivery behaviour testable without a running NATS server.

use crate::error::{LogError, StoreError};
use crate::event::TriggerEvent;
use crate::logger::EventLogger;
use crate::trigger::Trigger;
use async_trait::async_trait;
use std::time::Duration;
use tripwire_core::TriggerId;

/// Records a firing for a trigger id.
#[async_trait]
pub trait FiringRecorder: Send + Sync {
    async fn record(&self, id: TriggerId) -> Result<TriggerEvent, LogError>;
}

#[async_trait]
impl FiringRecorder for EventLogger {
    async fn record(&self, id: TriggerId) -> Result<TriggerEvent, LogError> {
        self.log_firing(id).await
    }
}

/// What the subscriber should tell the broker about a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Done with it, successfully or not worth retrying.
    Ack,
    /// Redeliver after `delay`.
    Retry { delay: Duration },
    /// Park it on the dead-letter subject, then acknowledge.
    DeadLetter { reason: String },
}

/// Bounded exponential backoff for transient recording failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deliveries allowed before a message is dead-lettered.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before redelivering after the given (1-based) attempt failed.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }
}

/// Maps recording outcomes to broker dispositions.
pub struct Dispatcher<R: FiringRecorder> {
    recorder: R,
    retry: RetryPolicy,
}

impl<R: FiringRecorder> Dispatcher<R> {
    #[must_use]
    pub fn new(recorder: R, retry: RetryPolicy) -> Self {
        Self { recorder, retry }
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Handles one delivery of `payload`. `attempt` is 1 on first delivery.
    ///
    /// - recorded: ack
    /// - trigger gone or inactive: ack (the firing is moot)
    /// - a concurrent firing or update won the conditional write: ack, since
    ///   recording again would count the same minute twice
    /// - transient failure with attempts left: retry with backoff
    /// - transient failure on the last attempt, or an unreadable payload:
    ///   dead-letter
    pub async fn dispatch(&self, payload: &[u8], attempt: u32) -> Disposition {
        let id = match parse_trigger_id(payload) {
            Ok(id) => id,
            Err(reason) => {
                tracing::warn!(%reason, "dropping unreadable firing message");
                return Disposition::DeadLetter { reason };
            }
        };

        match self.recorder.record(id).await {
            Ok(event) => {
                tracing::debug!(trigger_id = %id, event_id = %event.id, "firing recorded");
                Disposition::Ack
            }
            Err(e @ (LogError::TriggerNotFound { .. } | LogError::TriggerInactive { .. })) => {
                tracing::warn!(error = %e, trigger_id = %id, "discarding firing");
                Disposition::Ack
            }
            Err(e @ LogError::Store(StoreError::ConditionFailed { .. })) => {
                tracing::warn!(error = %e, trigger_id = %id, "firing superseded, discarding");
                Disposition::Ack
            }
            Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                let delay = self.retry.delay_for(attempt);
                tracing::warn!(
                    error = %e,
                    trigger_id = %id,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "firing not recorded, will retry"
                );
                Disposition::Retry { delay }
            }
            Err(e) => {
                tracing::error!(error = %e, trigger_id = %id, attempt, "giving up on firing");
                Disposition::DeadLetter {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Extracts the trigger id from a published message body.
///
/// The body is the JSON trigger snapshot produced by the publisher; only
/// its `id` is trusted, the rest is re-read from the store.
///
/// # Errors
///
/// Returns a description if the body is not JSON or has no valid `id`.
pub fn parse_trigger_id(payload: &[u8]) -> Result<TriggerId, String> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| format!("invalid JSON: {e}"))?;
    let raw = value
        .get("id")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| "missing string field `id`".to_string())?;
    raw.parse().map_err(|e| format!("invalid trigger id: {e}"))
}

/// Encodes a trigger the way [`parse_trigger_id`] expects to read it.
///
/// # Errors
///
/// Returns the serializer error message.
pub fn encode_trigger(trigger: &Trigger) -> Result<Vec<u8>, String> {
    serde_json::to_vec(trigger).map_err(|e| e.to_string())
}
