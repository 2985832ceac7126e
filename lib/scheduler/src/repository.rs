//! Storage seam for triggers and their events.

use crate::error::StoreError;
use crate::event::{EventFilter, EventStatus, Firing, TriggerEvent};
use crate::trigger::{NewTrigger, Trigger, TriggerConditions, TriggerFilter, TriggerPatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tripwire_core::{TriggerEventId, TriggerId};

/// Persistent store for triggers and firing events.
///
/// Listings are returned in creation order. Every write is atomic per call.
#[async_trait]
pub trait TriggerRepository: Send + Sync {
    /// Active scheduled triggers whose `trigger_time` falls in the same
    /// minute as `now`.
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Trigger>, StoreError>;

    async fn get(&self, id: TriggerId) -> Result<Trigger, StoreError>;

    async fn list(&self, filter: &TriggerFilter) -> Result<Vec<Trigger>, StoreError>;

    async fn create(&self, trigger: NewTrigger) -> Result<Trigger, StoreError>;

    /// Applies `patch` only if `conditions` hold on the row at write time.
    async fn update(
        &self,
        id: TriggerId,
        conditions: TriggerConditions,
        patch: TriggerPatch,
    ) -> Result<Trigger, StoreError>;

    /// Deletes the trigger and all of its events. Returns the deleted row.
    async fn delete(&self, id: TriggerId) -> Result<Trigger, StoreError>;

    /// Inserts the firing's event and advances the trigger in one
    /// transaction, guarded on `status = active` and
    /// `trigger_count = firing.expected_count`.
    async fn record_firing(&self, firing: Firing) -> Result<TriggerEvent, StoreError>;

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<TriggerEvent>, StoreError>;

    async fn set_event_status(
        &self,
        id: TriggerEventId,
        status: EventStatus,
    ) -> Result<TriggerEvent, StoreError>;

    /// Deletes one event. Returns the deleted row.
    async fn delete_event(&self, id: TriggerEventId) -> Result<TriggerEvent, StoreError>;

    /// Moves events in `from` with `triggered_at <= cutoff` to `to`.
    /// Returns the number of rows moved.
    async fn transition_events(
        &self,
        from: EventStatus,
        cutoff: DateTime<Utc>,
        to: EventStatus,
    ) -> Result<u64, StoreError>;

    /// Deletes events in `status` with `triggered_at <= cutoff`.
    /// Returns the number of rows deleted.
    async fn remove_events(
        &self,
        status: EventStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}
