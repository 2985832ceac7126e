//! In-process implementations of the storage and broker seams.
//!
//! Used by tests across the workspace and handy for running the API
//! without Postgres or NATS.

use crate::error::{PublishError, StoreError};
use crate::event::{EventFilter, EventStatus, Firing, TriggerEvent};
use crate::publisher::EventPublisher;
use crate::repository::TriggerRepository;
use crate::trigger::{
    MAX_INTERVAL_MINUTES, NewTrigger, Trigger, TriggerConditions, TriggerFilter, TriggerPatch,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::RwLock;
use tripwire_core::{TriggerEventId, TriggerId};

#[derive(Default)]
struct State {
    triggers: Vec<Trigger>,
    events: Vec<TriggerEvent>,
}

impl State {
    fn trigger_mut(&mut self, id: TriggerId) -> Result<&mut Trigger, StoreError> {
        self.triggers
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::TriggerNotFound { id })
    }

    fn event_mut(&mut self, id: TriggerEventId) -> Result<&mut TriggerEvent, StoreError> {
        self.events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::EventNotFound { id })
    }
}

/// Mirrors the `interval_minutes` check constraint of the SQL schema.
fn check_interval(interval: Option<i64>) -> Result<(), StoreError> {
    match interval {
        Some(i) if i <= 0 || i > MAX_INTERVAL_MINUTES => Err(StoreError::Constraint {
            message: format!("interval must be between 1 and {MAX_INTERVAL_MINUTES} minutes"),
        }),
        _ => Ok(()),
    }
}

fn take<T>(items: impl Iterator<Item = T>, limit: Option<u32>) -> Vec<T> {
    match limit {
        Some(n) => items.take(n as usize).collect(),
        None => items.collect(),
    }
}

/// A [`TriggerRepository`] backed by vectors behind a single lock, so every
/// call is atomic with respect to every other.
#[derive(Default)]
pub struct InMemoryTriggerRepository {
    state: RwLock<State>,
}

impl InMemoryTriggerRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TriggerRepository for InMemoryTriggerRepository {
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Trigger>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .triggers
            .iter()
            .filter(|t| t.is_due(now))
            .cloned()
            .collect())
    }

    async fn get(&self, id: TriggerId) -> Result<Trigger, StoreError> {
        let state = self.state.read().await;
        state
            .triggers
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(StoreError::TriggerNotFound { id })
    }

    async fn list(&self, filter: &TriggerFilter) -> Result<Vec<Trigger>, StoreError> {
        let state = self.state.read().await;
        Ok(take(
            state.triggers.iter().filter(|t| filter.matches(t)).cloned(),
            filter.limit,
        ))
    }

    async fn create(&self, trigger: NewTrigger) -> Result<Trigger, StoreError> {
        if trigger.trigger_count < 0 {
            return Err(StoreError::Constraint {
                message: "trigger_count must not be negative".to_string(),
            });
        }
        check_interval(trigger.interval_minutes)?;
        let trigger = trigger.into_trigger(TriggerId::new(), Utc::now());
        self.state.write().await.triggers.push(trigger.clone());
        Ok(trigger)
    }

    async fn update(
        &self,
        id: TriggerId,
        conditions: TriggerConditions,
        patch: TriggerPatch,
    ) -> Result<Trigger, StoreError> {
        let mut state = self.state.write().await;
        let trigger = state.trigger_mut(id)?;
        conditions
            .check(trigger)
            .map_err(|reason| StoreError::ConditionFailed { id, reason })?;
        if let Some(interval) = patch.interval_minutes {
            check_interval(interval)?;
        }
        patch.apply(trigger, Utc::now())?;
        Ok(trigger.clone())
    }

    async fn delete(&self, id: TriggerId) -> Result<Trigger, StoreError> {
        let mut state = self.state.write().await;
        let index = state
            .triggers
            .iter()
            .position(|t| t.id == id)
            .ok_or(StoreError::TriggerNotFound { id })?;
        let trigger = state.triggers.remove(index);
        state.events.retain(|e| e.trigger_id != id);
        Ok(trigger)
    }

    async fn record_firing(&self, firing: Firing) -> Result<TriggerEvent, StoreError> {
        let mut state = self.state.write().await;
        let id = firing.trigger_id;
        let trigger = state.trigger_mut(id)?;
        TriggerConditions::active()
            .check(trigger)
            .map_err(|reason| StoreError::ConditionFailed { id, reason })?;
        if trigger.trigger_count != firing.expected_count {
            return Err(StoreError::ConditionFailed {
                id,
                reason: format!(
                    "trigger_count is {}, expected {}",
                    trigger.trigger_count, firing.expected_count
                ),
            });
        }
        firing.apply_to(trigger);
        state.events.push(firing.event.clone());
        Ok(firing.event)
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<TriggerEvent>, StoreError> {
        let state = self.state.read().await;
        Ok(take(
            state.events.iter().filter(|e| filter.matches(e)).cloned(),
            filter.limit,
        ))
    }

    async fn set_event_status(
        &self,
        id: TriggerEventId,
        status: EventStatus,
    ) -> Result<TriggerEvent, StoreError> {
        let mut state = self.state.write().await;
        let event = state.event_mut(id)?;
        event.status = status;
        event.updated_at = Utc::now();
        Ok(event.clone())
    }

    async fn delete_event(&self, id: TriggerEventId) -> Result<TriggerEvent, StoreError> {
        let mut state = self.state.write().await;
        let index = state
            .events
            .iter()
            .position(|e| e.id == id)
            .ok_or(StoreError::EventNotFound { id })?;
        Ok(state.events.remove(index))
    }

    async fn transition_events(
        &self,
        from: EventStatus,
        cutoff: DateTime<Utc>,
        to: EventStatus,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut moved = 0;
        for event in state
            .events
            .iter_mut()
            .filter(|e| e.status == from && e.triggered_at <= cutoff)
        {
            event.status = to;
            event.updated_at = now;
            moved += 1;
        }
        Ok(moved)
    }

    async fn remove_events(
        &self,
        status: EventStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let before = state.events.len();
        state
            .events
            .retain(|e| !(e.status == status && e.triggered_at <= cutoff));
        Ok((before - state.events.len()) as u64)
    }
}

/// An [`EventPublisher`] that remembers what it was asked to publish.
///
/// Can be switched into a failing mode to simulate a broker outage.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Trigger>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything successfully published so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<Trigger> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, trigger: &Trigger) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::SendFailed {
                message: "broker unavailable".to_string(),
            });
        }
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(trigger.clone());
        Ok(())
    }
}
