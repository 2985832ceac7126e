//! Firing events and the trigger state machine step that produces them.
//!
//! Each recorded firing is a snapshot of the trigger at the moment it
//! fired. [`Trigger::fire`] is the pure half of recording a firing: it
//! computes the event row and the trigger's next state, and the repository
//! applies both atomically via [`Firing`].

use crate::error::LogError;
use crate::retention::RetentionPolicy;
use crate::trigger::{Trigger, TriggerKind, TriggerStatus, add_minutes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tripwire_core::{TriggerEventId, TriggerId};

/// Retention stage of a firing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Active,
    Archived,
}

impl EventStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// One recorded firing of a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub id: TriggerEventId,
    pub trigger_id: TriggerId,
    pub status: EventStatus,
    /// The minute the trigger fired.
    pub triggered_at: DateTime<Utc>,
    #[serde(rename = "trigger_name")]
    pub name: String,
    #[serde(rename = "trigger_type")]
    pub kind: TriggerKind,
    #[serde(rename = "trigger_message")]
    pub message: Option<String>,
    #[serde(rename = "interval")]
    pub interval_minutes: Option<i64>,
    #[serde(rename = "api_payload")]
    pub payload: Option<JsonValue>,
    pub last_triggered_on: Option<DateTime<Utc>>,
    /// The trigger's firing count including this firing.
    pub trigger_count: i64,
    /// When this event becomes eligible for archiving. Informational.
    pub archived_at: Option<DateTime<Utc>>,
    /// When this event becomes eligible for removal. Informational.
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Equality filters for listing events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub trigger_id: Option<TriggerId>,
    pub name: Option<String>,
    pub kind: Option<TriggerKind>,
    pub status: Option<EventStatus>,
    pub limit: Option<u32>,
}

impl EventFilter {
    #[must_use]
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        self.trigger_id.is_none_or(|id| event.trigger_id == id)
            && self.name.as_ref().is_none_or(|n| &event.name == n)
            && self.kind.is_none_or(|k| event.kind == k)
            && self.status.is_none_or(|s| event.status == s)
    }
}

/// Where a trigger goes after a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    /// Recurring: stays active, due again at this instant.
    Rearm { trigger_time: DateTime<Utc> },
    /// One-shot: becomes inactive, `trigger_time` unchanged.
    Retire,
}

/// The complete effect of one firing, computed without touching storage.
///
/// A repository applies it only if the trigger is still active and its
/// count still equals `expected_count`; otherwise another writer got there
/// first and the firing is rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    pub trigger_id: TriggerId,
    pub expected_count: i64,
    pub event: TriggerEvent,
    pub next: NextState,
    pub last_triggered_on: DateTime<Utc>,
    pub trigger_count: i64,
    pub fired_at: DateTime<Utc>,
}

impl Firing {
    /// Applies the trigger-side half of the firing.
    pub fn apply_to(&self, trigger: &mut Trigger) {
        trigger.last_triggered_on = Some(self.last_triggered_on);
        trigger.trigger_count = self.trigger_count;
        match self.next {
            NextState::Rearm { trigger_time } => trigger.trigger_time = Some(trigger_time),
            NextState::Retire => trigger.status = TriggerStatus::Inactive,
        }
        trigger.updated_at = self.fired_at;
    }
}

impl Trigger {
    /// Computes the firing of this trigger at `triggered_at`.
    ///
    /// `triggered_at` should already be truncated to the minute. A
    /// recurring trigger is re-armed to `triggered_at + interval`, so a
    /// trigger first due at `T0` fires at `T0 + n * interval` as long as
    /// every firing is recorded in the minute it became due.
    pub fn fire(
        &self,
        triggered_at: DateTime<Utc>,
        retention: &RetentionPolicy,
    ) -> Result<Firing, LogError> {
        let trigger_count = self.trigger_count + 1;
        let (archived_at, deleted_at) = retention.deadlines(triggered_at);
        let next = match self.interval_minutes {
            Some(minutes) => NextState::Rearm {
                trigger_time: add_minutes(triggered_at, minutes).ok_or(
                    LogError::RearmOutOfRange {
                        id: self.id,
                        interval_minutes: minutes,
                    },
                )?,
            },
            None => NextState::Retire,
        };

        let event = TriggerEvent {
            id: TriggerEventId::new(),
            trigger_id: self.id,
            status: EventStatus::Active,
            triggered_at,
            name: self.name.clone(),
            kind: self.kind,
            message: self.message.clone(),
            interval_minutes: self.interval_minutes,
            payload: self.payload.clone(),
            last_triggered_on: Some(triggered_at),
            trigger_count,
            archived_at: Some(archived_at),
            deleted_at: Some(deleted_at),
            created_at: triggered_at,
            updated_at: triggered_at,
        };

        Ok(Firing {
            trigger_id: self.id,
            expected_count: self.trigger_count,
            event,
            next,
            last_triggered_on: triggered_at,
            trigger_count,
            fired_at: triggered_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::NewTrigger;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, h, m, 0).unwrap()
    }

    #[test]
    fn recurring_trigger_rearms_by_interval() {
        let policy = RetentionPolicy::default();
        let mut trigger = NewTrigger::scheduled("every-five")
            .at(at(9, 0))
            .every(5)
            .into_trigger(TriggerId::new(), at(8, 0));

        for n in 0..4 {
            let due = at(9, 0) + Duration::minutes(5 * n);
            assert_eq!(trigger.trigger_time, Some(due));
            let firing = trigger.fire(due, &policy).unwrap();
            assert_eq!(firing.expected_count, n);
            firing.apply_to(&mut trigger);
            assert!(trigger.is_active());
        }
        assert_eq!(trigger.trigger_count, 4);
        assert_eq!(trigger.trigger_time, Some(at(9, 20)));
        assert_eq!(trigger.last_triggered_on, Some(at(9, 15)));
    }

    #[test]
    fn one_shot_retires_and_keeps_time() {
        let policy = RetentionPolicy::default();
        let mut trigger = NewTrigger::scheduled("once")
            .at(at(9, 0))
            .into_trigger(TriggerId::new(), at(8, 0));

        let firing = trigger.fire(at(9, 0), &policy).unwrap();
        assert_eq!(firing.next, NextState::Retire);
        firing.apply_to(&mut trigger);

        assert_eq!(trigger.status, TriggerStatus::Inactive);
        assert_eq!(trigger.trigger_time, Some(at(9, 0)));
        assert_eq!(trigger.trigger_count, 1);
    }

    #[test]
    fn unrepresentable_rearm_is_an_error() {
        let policy = RetentionPolicy::default();
        let mut trigger = NewTrigger::scheduled("huge")
            .at(at(9, 0))
            .into_trigger(TriggerId::new(), at(8, 0));
        trigger.interval_minutes = Some(i64::MAX);

        let err = trigger.fire(at(9, 0), &policy).unwrap_err();
        assert_eq!(
            err,
            LogError::RearmOutOfRange {
                id: trigger.id,
                interval_minutes: i64::MAX
            }
        );
    }

    #[test]
    fn event_snapshots_trigger() {
        let policy = RetentionPolicy::default();
        let mut trigger = NewTrigger::scheduled("snap")
            .at(at(9, 0))
            .every(60)
            .into_trigger(TriggerId::new(), at(8, 0));
        trigger.message = Some("wake up".to_string());
        trigger.trigger_count = 6;

        let event = trigger.fire(at(9, 0), &policy).unwrap().event;
        assert_eq!(event.trigger_id, trigger.id);
        assert_eq!(event.status, EventStatus::Active);
        assert_eq!(event.name, "snap");
        assert_eq!(event.message.as_deref(), Some("wake up"));
        assert_eq!(event.interval_minutes, Some(60));
        assert_eq!(event.trigger_count, 7);
        assert_eq!(event.archived_at, Some(at(9, 1)));
        assert_eq!(event.deleted_at, Some(at(9, 2)));
    }

    #[test]
    fn event_filter_by_status() {
        let policy = RetentionPolicy::default();
        let trigger = NewTrigger::scheduled("f")
            .at(at(9, 0))
            .into_trigger(TriggerId::new(), at(8, 0));
        let event = trigger.fire(at(9, 0), &policy).unwrap().event;
        let archived = EventFilter {
            status: Some(EventStatus::Archived),
            ..EventFilter::default()
        };
        assert!(!archived.matches(&event));
        assert!(EventFilter::default().matches(&event));
    }
}
