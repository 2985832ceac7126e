//! Error types for the scheduler crate.
//!
//! Every failure crossing a component boundary is an explicit value:
//! - `StoreError`: repository outcomes callers pattern-match on
//! - `LogError`: why a firing could not be recorded
//! - `PublishError`: broker-side failures of the publisher
//! - `SubscribeError`: broker-side failures of the subscriber (used as
//!   rootcause context during setup)
//! - `RetentionError`: invalid retention thresholds

use std::fmt;
use tripwire_core::{TriggerEventId, TriggerId};

/// Errors from repository operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No trigger with this id.
    TriggerNotFound { id: TriggerId },
    /// No trigger event with this id.
    EventNotFound { id: TriggerEventId },
    /// The row exists but a column-equality condition did not hold at write time.
    ConditionFailed { id: TriggerId, reason: String },
    /// Foreign-key, uniqueness or check violation reported by the store.
    Constraint { message: String },
    /// The store could not be reached or the query failed unexpectedly.
    Transport { message: String },
}

impl StoreError {
    /// Whether retrying the same operation later might succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TriggerNotFound { id } => write!(f, "trigger not found: {id}"),
            Self::EventNotFound { id } => write!(f, "trigger event not found: {id}"),
            Self::ConditionFailed { id, reason } => {
                write!(f, "update condition failed for {id}: {reason}")
            }
            Self::Constraint { message } => write!(f, "constraint violated: {message}"),
            Self::Transport { message } => write!(f, "store unavailable: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from recording a firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    /// The trigger does not exist (deleted after it was published, or a bad id).
    TriggerNotFound { id: TriggerId },
    /// The trigger is inactive and accepts no further firings.
    TriggerInactive { id: TriggerId },
    /// Re-arming by the interval would move `trigger_time` past the
    /// representable range.
    RearmOutOfRange { id: TriggerId, interval_minutes: i64 },
    /// The store rejected or failed the write.
    Store(StoreError),
}

impl LogError {
    /// Whether the firing could be recorded by trying again later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::TriggerNotFound { .. }
            | Self::TriggerInactive { .. }
            | Self::RearmOutOfRange { .. } => false,
        }
    }
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TriggerNotFound { id } => write!(f, "trigger not found: {id}"),
            Self::TriggerInactive { id } => write!(f, "trigger is inactive: {id}"),
            Self::RearmOutOfRange {
                id,
                interval_minutes,
            } => write!(
                f,
                "interval of {interval_minutes} minutes re-arms {id} out of range"
            ),
            Self::Store(e) => write!(f, "failed to record firing: {e}"),
        }
    }
}

impl std::error::Error for LogError {}

impl From<StoreError> for LogError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::TriggerNotFound { id } => Self::TriggerNotFound { id },
            other => Self::Store(other),
        }
    }
}

/// Errors from publishing a firing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Could not (re)connect to the broker.
    ConnectFailed { message: String },
    /// The trigger could not be encoded.
    SerializeFailed { message: String },
    /// The broker connection failed while sending.
    SendFailed { message: String },
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed { message } => write!(f, "broker connect failed: {message}"),
            Self::SerializeFailed { message } => {
                write!(f, "failed to serialize trigger: {message}")
            }
            Self::SendFailed { message } => write!(f, "publish failed: {message}"),
        }
    }
}

impl std::error::Error for PublishError {}

/// Errors from the subscriber side of the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeError {
    /// Could not connect to the broker.
    ConnectFailed { message: String },
    /// The stream capturing the topic could not be created.
    StreamSetup { message: String },
    /// The per-instance consumer could not be created.
    ConsumerSetup { message: String },
    /// The message stream ended or failed.
    Receive { message: String },
}

impl fmt::Display for SubscribeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed { message } => write!(f, "broker connect failed: {message}"),
            Self::StreamSetup { message } => write!(f, "stream setup failed: {message}"),
            Self::ConsumerSetup { message } => write!(f, "consumer setup failed: {message}"),
            Self::Receive { message } => write!(f, "receive failed: {message}"),
        }
    }
}

impl std::error::Error for SubscribeError {}

/// Errors from building a retention policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionError {
    /// Thresholds are negative or out of order.
    InvalidPolicy { reason: String },
}

impl fmt::Display for RetentionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPolicy { reason } => write!(f, "invalid retention policy: {reason}"),
        }
    }
}

impl std::error::Error for RetentionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let id = TriggerId::new();
        let err = StoreError::TriggerNotFound { id };
        assert!(err.to_string().contains("trigger not found"));
    }

    #[test]
    fn transient_classification() {
        assert!(
            StoreError::Transport {
                message: "pool timed out".to_string()
            }
            .is_transient()
        );
        assert!(
            !StoreError::Constraint {
                message: "fk".to_string()
            }
            .is_transient()
        );
        assert!(!LogError::TriggerInactive { id: TriggerId::new() }.is_transient());
    }

    #[test]
    fn lost_condition_race_is_not_transient() {
        let err = StoreError::ConditionFailed {
            id: TriggerId::new(),
            reason: "trigger_count is 2, expected 1".to_string(),
        };
        assert!(!err.is_transient());
        assert!(!LogError::from(err).is_transient());
        assert!(
            !LogError::RearmOutOfRange {
                id: TriggerId::new(),
                interval_minutes: i64::MAX
            }
            .is_transient()
        );
    }

    #[test]
    fn not_found_store_error_becomes_log_not_found() {
        let id = TriggerId::new();
        let err = LogError::from(StoreError::TriggerNotFound { id });
        assert_eq!(err, LogError::TriggerNotFound { id });
    }
}
