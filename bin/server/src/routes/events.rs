//! `/triggered_events/*`: due triggers, firing records and overrides.

use super::non_empty;
use crate::AppState;
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::requests::{EventQuery, FetchEventsQuery, TriggerIdQuery};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use chrono::Utc;
use tripwire_scheduler::{Trigger, TriggerEvent};

/// `GET /triggered_events/current_time`: triggers due this minute.
pub async fn current_time(State(state): State<AppState>) -> Result<Envelope<Trigger>, ApiError> {
    let due = state.repository.find_due(Utc::now()).await?;
    Ok(Envelope::success(
        "Fetched triggered event logs successfully",
        non_empty(due)?,
    ))
}

/// `POST /triggered_events/log_event?trigger_id=`: record one firing.
pub async fn log_event(
    State(state): State<AppState>,
    query: Result<Query<TriggerIdQuery>, QueryRejection>,
) -> Result<Envelope<TriggerEvent>, ApiError> {
    let Query(query) = query?;
    let event = state.logger.log_firing(query.id()?).await?;
    Ok(Envelope::success(
        "Trigger event logged successfully",
        vec![event],
    ))
}

/// `GET /triggered_events/fetch_events`
pub async fn fetch_events(
    State(state): State<AppState>,
    query: Result<Query<FetchEventsQuery>, QueryRejection>,
) -> Result<Envelope<TriggerEvent>, ApiError> {
    let Query(query) = query?;
    let events = state.repository.list_events(&query.into_filter()?).await?;
    Ok(Envelope::success(
        "Fetched triggered event logs successfully",
        non_empty(events)?,
    ))
}

/// `PATCH /triggered_events/update_status?event_id=&status=`
///
/// Operator override; touches nothing but the event's status.
pub async fn update_status(
    State(state): State<AppState>,
    query: Result<Query<EventQuery>, QueryRejection>,
) -> Result<Envelope<TriggerEvent>, ApiError> {
    let Query(query) = query?;
    let id = query.id()?;
    let status = query.status()?;
    let event = state.repository.set_event_status(id, status).await?;
    tracing::info!(event_id = %id, status = status.as_str(), "forced event status");
    Ok(Envelope::success("Status updated successfully", vec![event]))
}

/// `DELETE /triggered_events/delete_event?event_id=`
pub async fn delete_event(
    State(state): State<AppState>,
    query: Result<Query<EventQuery>, QueryRejection>,
) -> Result<Envelope<TriggerEvent>, ApiError> {
    let Query(query) = query?;
    let id = query.id()?;
    state.repository.delete_event(id).await?;
    Ok(Envelope::success("Record Deleted Successfully", Vec::new()))
}
