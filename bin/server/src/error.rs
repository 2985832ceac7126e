//! Error types for the server.
//!
//! - `ApiError`: what a request handler can fail with, rendered as a
//!   failure envelope
//! - `StartupError`: rootcause context for process bootstrap

use crate::envelope::Envelope;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use tripwire_scheduler::{LogError, StoreError};

/// Request-level failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Malformed or out-of-range input.
    Validation { message: String },
    /// Unknown trigger or event id.
    NotFound { message: String },
    /// The target exists but may not be changed this way.
    Forbidden { message: String },
    /// Missing or invalid bearer token.
    Unauthorized { message: String },
    /// The store rejected the write; its message is surfaced.
    Constraint { message: String },
    /// Anything else. Details are logged, never returned.
    Internal { details: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::Constraint { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { message }
            | Self::NotFound { message }
            | Self::Forbidden { message }
            | Self::Unauthorized { message }
            | Self::Constraint { message } => write!(f, "{message}"),
            Self::Internal { .. } => write!(f, "Internal Server Error"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal { details } = &self {
            tracing::error!(error = %details, "request failed");
        }
        Envelope::<serde_json::Value>::failure(self.status(), self.to_string()).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::TriggerNotFound { .. } => Self::not_found("Trigger not found"),
            StoreError::EventNotFound { .. } => Self::not_found("Trigger event not found"),
            // The only condition the API writes under is `status = active`.
            StoreError::ConditionFailed { .. } => Self::forbidden("Cannot change inactive triggers"),
            StoreError::Constraint { message } => Self::Constraint { message },
            StoreError::Transport { .. } => Self::Internal {
                details: e.to_string(),
            },
        }
    }
}

impl From<LogError> for ApiError {
    fn from(e: LogError) -> Self {
        match e {
            LogError::TriggerNotFound { .. } => Self::not_found("Trigger not found"),
            LogError::TriggerInactive { .. } => Self::forbidden("Trigger is inactive"),
            LogError::RearmOutOfRange { .. } => {
                Self::validation("interval_minutes moves trigger_time out of range")
            }
            LogError::Store(StoreError::ConditionFailed { .. }) => {
                Self::forbidden("Trigger changed while logging the event")
            }
            LogError::Store(other) => other.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

/// Failures while bringing the process up.
#[derive(Debug)]
pub enum StartupError {
    Config { details: String },
    Database { details: String },
    Migrations { details: String },
    Bind { addr: String, details: String },
    Serve { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "failed to load configuration: {details}"),
            Self::Database { details } => write!(f, "failed to connect to database: {details}"),
            Self::Migrations { details } => write!(f, "failed to run migrations: {details}"),
            Self::Bind { addr, details } => write!(f, "failed to bind to {addr}: {details}"),
            Self::Serve { details } => write!(f, "server error: {details}"),
        }
    }
}

impl std::error::Error for StartupError {}
