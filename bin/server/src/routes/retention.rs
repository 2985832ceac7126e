//! `/triggered_logs/*`: on-demand retention.

use crate::AppState;
use crate::envelope::Envelope;
use crate::error::ApiError;
use axum::extract::State;
use tripwire_scheduler::SweepOutcome;

/// `PATCH /triggered_logs/update_and_delete`: one sweep, now.
pub async fn update_and_delete(
    State(state): State<AppState>,
) -> Result<Envelope<SweepOutcome>, ApiError> {
    let outcome = state.sweeper.sweep().await?;
    tracing::info!(archived = outcome.archived, removed = outcome.removed, "manual retention sweep");
    Ok(Envelope::success(
        "Records updated and deleted successfully",
        vec![outcome],
    ))
}
