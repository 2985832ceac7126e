//! `/triggers/*`: create, fetch, update and delete triggers.

use super::non_empty;
use crate::AppState;
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::requests::{
    CreateTriggerRequest, FetchTriggersQuery, TriggerIdQuery, check_rearm, parse_update,
};
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use chrono::Utc;
use serde_json::Value as JsonValue;
use tripwire_scheduler::{Trigger, TriggerConditions, TriggerKind};

/// `POST /triggers/create_trigger`
///
/// API triggers are published straight away; a failed publish is logged
/// and does not fail the request.
pub async fn create_trigger(
    State(state): State<AppState>,
    body: Result<Json<CreateTriggerRequest>, JsonRejection>,
) -> Result<Envelope<Trigger>, ApiError> {
    let Json(request) = body?;
    let new_trigger = request.into_new_trigger(Utc::now())?;
    let trigger = state.repository.create(new_trigger).await?;
    tracing::info!(trigger_id = %trigger.id, kind = trigger.kind.as_str(), "created trigger");

    if trigger.kind == TriggerKind::Api
        && let Err(e) = state.publisher.publish(&trigger).await
    {
        tracing::warn!(error = %e, trigger_id = %trigger.id, "failed to publish api trigger");
    }

    Ok(Envelope::success(
        format!("Trigger '{}' created successfully", trigger.name),
        vec![trigger],
    ))
}

/// `GET /triggers/fetch`
pub async fn fetch_triggers(
    State(state): State<AppState>,
    query: Result<Query<FetchTriggersQuery>, QueryRejection>,
) -> Result<Envelope<Trigger>, ApiError> {
    let Query(query) = query?;
    let triggers = state.repository.list(&query.into_filter()?).await?;
    Ok(Envelope::success(
        "Fetched triggers successfully",
        non_empty(triggers)?,
    ))
}

/// `PATCH /triggers/update_trigger?trigger_id=`
///
/// The trigger is looked up before the body is validated, so an unknown id
/// is a 404 whatever the body holds. The write is conditioned on the
/// trigger still being active, so a firing that retires it concurrently
/// wins and the update is refused.
pub async fn update_trigger(
    State(state): State<AppState>,
    query: Result<Query<TriggerIdQuery>, QueryRejection>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> Result<Envelope<Trigger>, ApiError> {
    let Query(query) = query?;
    let id = query.id()?;

    let current = state.repository.get(id).await?;
    if !current.is_active() {
        return Err(ApiError::forbidden("Cannot change inactive triggers"));
    }

    let Json(body) = body?;
    let JsonValue::Object(fields) = body else {
        return Err(ApiError::validation("Request body must be a JSON object"));
    };
    let now = Utc::now();
    let patch = parse_update(&fields, now)?;

    let mut preview = current;
    patch.apply(&mut preview, now)?;
    check_rearm(&patch, preview.trigger_time, now)?;

    let updated = state
        .repository
        .update(id, TriggerConditions::active(), patch)
        .await?;
    tracing::info!(trigger_id = %id, status = updated.status.as_str(), "updated trigger");

    Ok(Envelope::success("Updated successfully", vec![updated]))
}

/// `DELETE /triggers/delete_trigger?trigger_id=`
pub async fn delete_trigger(
    State(state): State<AppState>,
    query: Result<Query<TriggerIdQuery>, QueryRejection>,
) -> Result<Envelope<Trigger>, ApiError> {
    let Query(query) = query?;
    let id = query.id()?;
    state.repository.delete(id).await?;
    tracing::info!(trigger_id = %id, "deleted trigger");
    Ok(Envelope::success("Record Deleted Successfully", Vec::new()))
}
