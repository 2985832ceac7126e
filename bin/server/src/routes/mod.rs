//! HTTP handlers, grouped by resource.

pub mod events;
pub mod retention;
pub mod triggers;

use crate::error::ApiError;

/// Fetch endpoints answer 404 rather than an empty success.
fn non_empty<T>(records: Vec<T>) -> Result<Vec<T>, ApiError> {
    if records.is_empty() {
        return Err(ApiError::not_found("No Records Found"));
    }
    Ok(records)
}
