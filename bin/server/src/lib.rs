//! tripwire server: REST API over the trigger store, plus the Postgres
//! repository and configuration the binary wires together.

pub mod auth;
pub mod config;
pub mod db;
pub mod envelope;
pub mod error;
pub mod requests;
pub mod routes;

use crate::auth::AuthValidator;
use crate::error::ApiError;
use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, patch, post};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tripwire_scheduler::{
    EventLogger, EventPublisher, RetentionPolicy, RetentionSweeper, TriggerRepository,
};

/// Shared handles every handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn TriggerRepository>,
    pub publisher: Arc<dyn EventPublisher>,
    pub auth: Arc<dyn AuthValidator>,
    pub logger: EventLogger,
    pub sweeper: RetentionSweeper,
}

impl AppState {
    #[must_use]
    pub fn new(
        repository: Arc<dyn TriggerRepository>,
        publisher: Arc<dyn EventPublisher>,
        auth: Arc<dyn AuthValidator>,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            logger: EventLogger::new(repository.clone(), retention),
            sweeper: RetentionSweeper::new(repository.clone(), retention),
            repository,
            publisher,
            auth,
        }
    }
}

/// Builds the API router. Every route requires a bearer token.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/triggers/create_trigger", post(routes::triggers::create_trigger))
        .route("/triggers/fetch", get(routes::triggers::fetch_triggers))
        .route("/triggers/update_trigger", patch(routes::triggers::update_trigger))
        .route("/triggers/delete_trigger", delete(routes::triggers::delete_trigger))
        .route("/triggered_events/current_time", get(routes::events::current_time))
        .route("/triggered_events/log_event", post(routes::events::log_event))
        .route("/triggered_events/fetch_events", get(routes::events::fetch_events))
        .route("/triggered_events/update_status", patch(routes::events::update_status))
        .route("/triggered_events/delete_event", delete(routes::events::delete_event))
        .route(
            "/triggered_logs/update_and_delete",
            patch(routes::retention::update_and_delete),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        .fallback(|| async { ApiError::not_found("Route not found") })
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
