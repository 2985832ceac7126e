//! The uniform response body every route answers with.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// `{status, status_code, message, timestamp, count, records, status_bool}`.
///
/// `count` always equals `records.len()`; failures carry no records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T = JsonValue> {
    pub status: Outcome,
    pub status_code: u16,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub count: usize,
    pub records: Vec<T>,
    pub status_bool: bool,
}

impl<T> Envelope<T> {
    pub fn success(message: impl Into<String>, records: Vec<T>) -> Self {
        Self {
            status: Outcome::Success,
            status_code: StatusCode::OK.as_u16(),
            message: message.into(),
            timestamp: Utc::now(),
            count: records.len(),
            records,
            status_bool: true,
        }
    }

    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: Outcome::Failure,
            status_code: status.as_u16(),
            message: message.into(),
            timestamp: Utc::now(),
            count: 0,
            records: Vec::new(),
            status_bool: false,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
