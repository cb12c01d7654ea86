//! Administrative Handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::shared::error::AppError;
use crate::startup::AppState;

/// Finish-all response
#[derive(Debug, Serialize)]
pub struct FinishQueueResponse {
    /// Sessions asked to terminate
    pub finished: usize,
}

/// Force-finish every registered session, ending the sale window.
///
/// Waiting records are left alone; workers retire them as usual.
pub async fn finish_queue(
    State(state): State<AppState>,
) -> Result<Json<FinishQueueResponse>, AppError> {
    tracing::info!("Finish-queue requested");
    let finished = state
        .registry
        .finish_all()
        .await
        .map_err(|e| AppError::Unavailable(e.to_string()))?;
    Ok(Json(FinishQueueResponse { finished }))
}
