//! Trigger definitions and the minute clock they run on.
//!
//! A trigger is either `scheduled` (fired by the minute poller once its
//! `trigger_time` is due) or `api` (fired once, immediately, when it is
//! created through the API). Recurring triggers carry an interval in whole
//! minutes; triggers without one retire after their first firing.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tripwire_core::TriggerId;

use crate::error::StoreError;

/// Largest accepted recurrence interval: ten years of minutes.
pub const MAX_INTERVAL_MINUTES: i64 = 10 * 366 * 24 * 60;

/// Whether a trigger fires on its own schedule or on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Fired by the poller when `trigger_time` is due.
    Scheduled,
    /// Fired once at creation time; carries an API payload.
    Api,
}

impl TriggerKind {
    /// Wire and column representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Api => "api",
        }
    }

    /// Parses the wire representation. Returns `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "api" => Some(Self::Api),
            _ => None,
        }
    }
}

/// Lifecycle status of a trigger. `Inactive` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Active,
    Inactive,
}

impl TriggerStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// A registered trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: TriggerId,
    #[serde(rename = "trigger_name")]
    pub name: String,
    #[serde(rename = "trigger_type")]
    pub kind: TriggerKind,
    pub status: TriggerStatus,
    /// Next instant this trigger is due, at minute precision.
    pub trigger_time: Option<DateTime<Utc>>,
    /// Recurrence period in minutes. `None` means one-shot.
    #[serde(rename = "interval")]
    pub interval_minutes: Option<i64>,
    #[serde(rename = "trigger_message")]
    pub message: Option<String>,
    #[serde(rename = "api_payload")]
    pub payload: Option<JsonValue>,
    pub last_triggered_on: Option<DateTime<Utc>>,
    /// Number of recorded firings. Always equals the number of events
    /// ever recorded for this trigger.
    pub trigger_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trigger {
    /// Returns true if the trigger still accepts firings and updates.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == TriggerStatus::Active
    }

    /// Returns true if the trigger re-arms after each firing.
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        self.interval_minutes.is_some()
    }

    /// Returns true if the poller should publish this trigger at `now`.
    ///
    /// Due means active, scheduled, and a `trigger_time` in the same
    /// minute as `now`. A trigger whose minute passed without a recorded
    /// firing is not due again until its `trigger_time` is edited.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active()
            && self.kind == TriggerKind::Scheduled
            && self
                .trigger_time
                .is_some_and(|t| truncate_to_minute(t) == truncate_to_minute(now))
    }
}

/// Input for creating a trigger. The store assigns id, status and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrigger {
    pub name: String,
    pub kind: TriggerKind,
    pub trigger_time: Option<DateTime<Utc>>,
    pub interval_minutes: Option<i64>,
    pub message: Option<String>,
    pub payload: Option<JsonValue>,
    pub last_triggered_on: Option<DateTime<Utc>>,
    pub trigger_count: i64,
}

impl NewTrigger {
    /// A scheduled trigger with the given name and no other fields set.
    #[must_use]
    pub fn scheduled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TriggerKind::Scheduled,
            trigger_time: None,
            interval_minutes: None,
            message: None,
            payload: None,
            last_triggered_on: None,
            trigger_count: 0,
        }
    }

    /// Sets the first due time.
    #[must_use]
    pub fn at(mut self, trigger_time: DateTime<Utc>) -> Self {
        self.trigger_time = Some(trigger_time);
        self
    }

    /// Makes the trigger recurring.
    #[must_use]
    pub fn every(mut self, minutes: i64) -> Self {
        self.interval_minutes = Some(minutes);
        self
    }

    /// Turns this into an API trigger carrying `payload`.
    #[must_use]
    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.kind = TriggerKind::Api;
        self.payload = Some(payload);
        self
    }

    /// Materialises the trigger row as the store would write it.
    #[must_use]
    pub fn into_trigger(self, id: TriggerId, now: DateTime<Utc>) -> Trigger {
        Trigger {
            id,
            name: self.name,
            kind: self.kind,
            status: TriggerStatus::Active,
            trigger_time: self.trigger_time.map(truncate_to_minute),
            interval_minutes: self.interval_minutes,
            message: self.message,
            payload: self.payload,
            last_triggered_on: self.last_triggered_on,
            trigger_count: self.trigger_count,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A partial update. `None` leaves the field untouched; the nested
/// `Option` on nullable fields distinguishes "clear" from "keep".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerPatch {
    pub name: Option<String>,
    pub message: Option<Option<String>>,
    pub trigger_time: Option<DateTime<Utc>>,
    pub interval_minutes: Option<Option<i64>>,
    pub last_triggered_on: Option<DateTime<Utc>>,
    pub payload: Option<JsonValue>,
    pub status: Option<TriggerStatus>,
}

impl TriggerPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the patch in place and bumps `updated_at`.
    ///
    /// Changing the interval without an explicit `trigger_time` re-arms the
    /// trigger from its current `trigger_time` plus the new interval, so the
    /// new period takes effect from the next firing. Fails without touching
    /// the trigger when that re-arm is not representable.
    pub fn apply(&self, trigger: &mut Trigger, now: DateTime<Utc>) -> Result<(), StoreError> {
        let rearmed = match (self.interval_minutes, self.trigger_time, trigger.trigger_time) {
            (Some(Some(minutes)), None, Some(current)) => Some(
                add_minutes(current, minutes).ok_or_else(|| StoreError::Constraint {
                    message: format!("interval of {minutes} minutes re-arms trigger out of range"),
                })?,
            ),
            _ => None,
        };

        if let Some(name) = &self.name {
            trigger.name.clone_from(name);
        }
        if let Some(message) = &self.message {
            trigger.message.clone_from(message);
        }
        if let Some(interval) = self.interval_minutes {
            trigger.interval_minutes = interval;
        }
        if let Some(trigger_time) = rearmed {
            trigger.trigger_time = Some(trigger_time);
        }
        if let Some(trigger_time) = self.trigger_time {
            trigger.trigger_time = Some(truncate_to_minute(trigger_time));
        }
        if let Some(last) = self.last_triggered_on {
            trigger.last_triggered_on = Some(last);
        }
        if let Some(payload) = &self.payload {
            trigger.payload = Some(payload.clone());
        }
        if let Some(status) = self.status {
            trigger.status = status;
        }
        trigger.updated_at = now;
        Ok(())
    }
}

/// Column-equality conditions an update must satisfy at write time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerConditions {
    pub status: Option<TriggerStatus>,
}

impl TriggerConditions {
    /// No conditions; the write always applies.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Only write while the trigger is still active.
    #[must_use]
    pub fn active() -> Self {
        Self {
            status: Some(TriggerStatus::Active),
        }
    }

    /// Checks the conditions against the current row. On failure returns
    /// a description of the first mismatch.
    pub fn check(&self, trigger: &Trigger) -> Result<(), String> {
        match self.status {
            Some(expected) if trigger.status != expected => Err(format!(
                "status is {}, expected {}",
                trigger.status.as_str(),
                expected.as_str()
            )),
            _ => Ok(()),
        }
    }
}

/// Equality filters for listing triggers. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerFilter {
    pub id: Option<TriggerId>,
    pub name: Option<String>,
    pub kind: Option<TriggerKind>,
    pub status: Option<TriggerStatus>,
    pub limit: Option<u32>,
}

impl TriggerFilter {
    #[must_use]
    pub fn matches(&self, trigger: &Trigger) -> bool {
        self.id.is_none_or(|id| trigger.id == id)
            && self.name.as_ref().is_none_or(|n| &trigger.name == n)
            && self.kind.is_none_or(|k| trigger.kind == k)
            && self.status.is_none_or(|s| trigger.status == s)
    }
}

/// Drops seconds and sub-second precision.
#[must_use]
pub fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// `t` moved forward by `minutes`, or `None` when the result falls outside
/// the range `DateTime<Utc>` can represent.
#[must_use]
pub fn add_minutes(t: DateTime<Utc>, minutes: i64) -> Option<DateTime<Utc>> {
    Duration::try_minutes(minutes).and_then(|d| t.checked_add_signed(d))
}

/// The first whole-minute instant strictly after `t`.
///
/// An instant exactly on a boundary maps to the following boundary, so a
/// loop that sleeps until this value and then recomputes never runs the
/// same minute twice.
#[must_use]
pub fn next_minute_boundary(t: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_minute(t) + Duration::minutes(1)
}
