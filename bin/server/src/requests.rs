//! Request bodies and query strings, and their validation.
//!
//! Times on the wire use the minute format `YYYY-MM-DD-HH:mm`, in UTC.
//! Everything here is checked before the repository is touched.

use crate::error::ApiError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::str::FromStr;
use tripwire_scheduler::{
    EventFilter, EventStatus, MAX_INTERVAL_MINUTES, NewTrigger, TriggerFilter, TriggerKind,
    TriggerPatch, TriggerStatus, add_minutes, truncate_to_minute,
};

/// Wire format for minute-precision times.
pub const TIME_FORMAT: &str = "%Y-%m-%d-%H:%M";

const MAX_NAME_LEN: usize = 100;
const MAX_MESSAGE_LEN: usize = 100;

/// Parses a `YYYY-MM-DD-HH:mm` UTC time.
///
/// # Errors
///
/// Returns a validation error naming `field` if the value does not match.
pub fn parse_time(field: &str, value: &str) -> Result<DateTime<Utc>, ApiError> {
    NaiveDateTime::parse_from_str(value.trim(), TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| ApiError::validation(format!("{field} must be in YYYY-MM-DD-HH:mm format")))
}

#[must_use]
pub fn format_time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

fn ensure_future(field: &str, t: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), ApiError> {
    if truncate_to_minute(t) <= truncate_to_minute(now) {
        return Err(ApiError::validation(format!("{field} must be in the future")));
    }
    Ok(())
}

fn ensure_not_future(field: &str, t: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), ApiError> {
    if t > now {
        return Err(ApiError::validation(format!("{field} cannot be in the future")));
    }
    Ok(())
}

fn check_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("trigger_name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::validation(format!(
            "trigger_name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn check_message(message: &str) -> Result<String, ApiError> {
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(ApiError::validation(format!(
            "trigger_message must be at most {MAX_MESSAGE_LEN} characters"
        )));
    }
    Ok(message.to_string())
}

fn check_interval(interval: i64) -> Result<i64, ApiError> {
    if interval <= 0 {
        return Err(ApiError::validation("interval must be a positive number of minutes"));
    }
    if interval > MAX_INTERVAL_MINUTES {
        return Err(ApiError::validation(format!(
            "interval must be at most {MAX_INTERVAL_MINUTES} minutes"
        )));
    }
    Ok(interval)
}

/// Body of `POST /triggers/create_trigger`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateTriggerRequest {
    pub trigger_name: Option<String>,
    pub trigger_time: Option<String>,
    pub interval: Option<i64>,
    pub trigger_message: Option<String>,
    pub api_payload: Option<JsonValue>,
    pub last_triggered_on: Option<String>,
    pub trigger_count: Option<i64>,
}

impl CreateTriggerRequest {
    /// Validates the request as of `now`.
    ///
    /// A non-empty `api_payload` object makes an API trigger due in the
    /// creation minute, with any interval ignored. Otherwise the trigger is
    /// scheduled and needs a `trigger_time`, an `interval`, or both; a
    /// missing `trigger_time` means one interval from now.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first problem found.
    pub fn into_new_trigger(self, now: DateTime<Utc>) -> Result<NewTrigger, ApiError> {
        let name = check_name(self.trigger_name.as_deref().unwrap_or_default())?;
        let message = self.trigger_message.as_deref().map(check_message).transpose()?;

        let trigger_count = self.trigger_count.unwrap_or(0);
        if trigger_count < 0 {
            return Err(ApiError::validation("trigger_count cannot be negative"));
        }

        let last_triggered_on = self
            .last_triggered_on
            .as_deref()
            .map(|raw| parse_time("last_triggered_on", raw))
            .transpose()?;
        if let Some(last) = last_triggered_on {
            ensure_not_future("last_triggered_on", last, now)?;
        }

        let payload = match self.api_payload {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::Object(map)) if map.is_empty() => None,
            Some(JsonValue::Object(map)) => Some(JsonValue::Object(map)),
            Some(_) => return Err(ApiError::validation("api_payload must be a JSON object")),
        };

        let mut trigger = NewTrigger::scheduled(name);
        trigger.message = message;
        trigger.last_triggered_on = last_triggered_on;
        trigger.trigger_count = trigger_count;

        if let Some(payload) = payload {
            return Ok(trigger
                .with_payload(payload)
                .at(truncate_to_minute(now)));
        }

        let interval = self.interval.map(check_interval).transpose()?;
        let trigger_time = match (self.trigger_time.as_deref(), interval) {
            (Some(raw), _) => parse_time("trigger_time", raw)?,
            (None, Some(minutes)) => add_minutes(truncate_to_minute(now), minutes)
                .ok_or_else(|| ApiError::validation("interval moves trigger_time out of range"))?,
            (None, None) => {
                return Err(ApiError::validation(
                    "trigger_time or interval is required for scheduled triggers",
                ));
            }
        };
        ensure_future("trigger_time", trigger_time, now)?;

        trigger.interval_minutes = interval;
        Ok(trigger.at(trigger_time))
    }
}

fn expect_str<'a>(field: &str, value: &'a JsonValue) -> Result<&'a str, ApiError> {
    value
        .as_str()
        .ok_or_else(|| ApiError::validation(format!("{field} must be a string")))
}

/// Parses a `PATCH /triggers/update_trigger` body into a patch.
///
/// Time checks that depend only on the body happen here; the resulting
/// re-armed time after an interval change is checked by the handler once
/// the current trigger is known.
///
/// # Errors
///
/// `Forbidden` if the body targets `id`; `Validation` for unknown or
/// managed fields, bad values, or an empty body.
pub fn parse_update(
    body: &Map<String, JsonValue>,
    now: DateTime<Utc>,
) -> Result<TriggerPatch, ApiError> {
    if body.contains_key("id") {
        return Err(ApiError::forbidden("Cannot change ID"));
    }

    let mut patch = TriggerPatch::default();
    for (field, value) in body {
        match field.as_str() {
            "trigger_name" => patch.name = Some(check_name(expect_str(field, value)?)?),
            "trigger_message" => {
                patch.message = Some(match value {
                    JsonValue::Null => None,
                    other => Some(check_message(expect_str(field, other)?)?),
                });
            }
            "trigger_time" => {
                let t = parse_time(field, expect_str(field, value)?)?;
                ensure_future(field, t, now)?;
                patch.trigger_time = Some(t);
            }
            "interval" => {
                patch.interval_minutes = Some(match value {
                    JsonValue::Null => None,
                    other => Some(check_interval(other.as_i64().ok_or_else(|| {
                        ApiError::validation("interval must be an integer or null")
                    })?)?),
                });
            }
            "last_triggered_on" => {
                let t = parse_time(field, expect_str(field, value)?)?;
                ensure_not_future(field, t, now)?;
                patch.last_triggered_on = Some(t);
            }
            "api_payload" => {
                if !value.is_object() {
                    return Err(ApiError::validation("api_payload must be a JSON object"));
                }
                patch.payload = Some(value.clone());
            }
            "status" => match expect_str(field, value)? {
                "inactive" => patch.status = Some(TriggerStatus::Inactive),
                _ => {
                    return Err(ApiError::validation(
                        "status can only be changed to inactive",
                    ));
                }
            },
            "trigger_count" => {
                return Err(ApiError::validation(
                    "trigger_count is managed by recorded firings",
                ));
            }
            other => return Err(ApiError::validation(format!("Unknown field: {other}"))),
        }
    }

    if patch.is_empty() {
        return Err(ApiError::validation("No fields to update"));
    }
    Ok(patch)
}

/// Re-validates a patch that changes the interval without a new time,
/// against the trigger's current time.
///
/// # Errors
///
/// Returns a validation error if the re-armed time is not in the future.
pub fn check_rearm(
    patch: &TriggerPatch,
    rearmed: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    if matches!(patch.interval_minutes, Some(Some(_)))
        && patch.trigger_time.is_none()
        && let Some(t) = rearmed
    {
        ensure_future("trigger_time", t, now)?;
    }
    Ok(())
}

fn parse_param<T: FromStr>(field: &str, raw: Option<&str>) -> Result<Option<T>, ApiError>
where
    T::Err: std::fmt::Display,
{
    raw.map(|s| {
        s.parse::<T>()
            .map_err(|e| ApiError::validation(format!("invalid {field}: {e}")))
    })
    .transpose()
}

fn parse_kind(raw: Option<&str>) -> Result<Option<TriggerKind>, ApiError> {
    raw.map(|s| {
        TriggerKind::parse(s)
            .ok_or_else(|| ApiError::validation("trigger_type must be scheduled or api"))
    })
    .transpose()
}

/// Query string of `GET /triggers/fetch`.
#[derive(Debug, Default, Deserialize)]
pub struct FetchTriggersQuery {
    pub trigger_id: Option<String>,
    pub trigger_name: Option<String>,
    pub trigger_type: Option<String>,
    pub num_records: Option<String>,
}

impl FetchTriggersQuery {
    /// # Errors
    ///
    /// Returns a validation error for malformed ids, types or limits.
    pub fn into_filter(self) -> Result<TriggerFilter, ApiError> {
        Ok(TriggerFilter {
            id: parse_param("trigger_id", self.trigger_id.as_deref())?,
            name: self.trigger_name,
            kind: parse_kind(self.trigger_type.as_deref())?,
            status: None,
            limit: parse_param("num_records", self.num_records.as_deref())?,
        })
    }
}

/// Query string of `GET /triggered_events/fetch_events`.
#[derive(Debug, Default, Deserialize)]
pub struct FetchEventsQuery {
    pub trigger_id: Option<String>,
    pub trigger_name: Option<String>,
    pub trigger_type: Option<String>,
    pub status: Option<String>,
    pub num_records: Option<String>,
}

impl FetchEventsQuery {
    /// # Errors
    ///
    /// Returns a validation error for malformed ids, types, statuses or limits.
    pub fn into_filter(self) -> Result<EventFilter, ApiError> {
        let status = self
            .status
            .as_deref()
            .map(|s| {
                EventStatus::parse(s)
                    .ok_or_else(|| ApiError::validation("status must be active or archived"))
            })
            .transpose()?;
        Ok(EventFilter {
            trigger_id: parse_param("trigger_id", self.trigger_id.as_deref())?,
            name: self.trigger_name,
            kind: parse_kind(self.trigger_type.as_deref())?,
            status,
            limit: parse_param("num_records", self.num_records.as_deref())?,
        })
    }
}

/// `?trigger_id=` on single-trigger routes.
#[derive(Debug, Default, Deserialize)]
pub struct TriggerIdQuery {
    pub trigger_id: Option<String>,
}

impl TriggerIdQuery {
    /// # Errors
    ///
    /// Returns a validation error if the id is missing or malformed.
    pub fn id(&self) -> Result<tripwire_core::TriggerId, ApiError> {
        parse_param("trigger_id", self.trigger_id.as_deref())?
            .ok_or_else(|| ApiError::validation("trigger_id is required"))
    }
}

/// `?event_id=&status=` on single-event routes.
#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    pub event_id: Option<String>,
    pub status: Option<String>,
}

impl EventQuery {
    /// # Errors
    ///
    /// Returns a validation error if the id is missing or malformed.
    pub fn id(&self) -> Result<tripwire_core::TriggerEventId, ApiError> {
        parse_param("event_id", self.event_id.as_deref())?
            .ok_or_else(|| ApiError::validation("event_id is required"))
    }

    /// # Errors
    ///
    /// Returns a validation error if the status is missing or unknown.
    pub fn status(&self) -> Result<EventStatus, ApiError> {
        self.status
            .as_deref()
            .and_then(EventStatus::parse)
            .ok_or_else(|| ApiError::validation("status must be active or archived"))
    }
}
