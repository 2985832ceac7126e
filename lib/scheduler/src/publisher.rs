//! Outbound half of the firing pipeline.

use crate::error::PublishError;
use crate::trigger::Trigger;
use async_trait::async_trait;

/// Announces that a trigger fired.
///
/// Delivery is best effort: an `Ok` means the message left this process,
/// not that any subscriber recorded it.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, trigger: &Trigger) -> Result<(), PublishError>;
}
