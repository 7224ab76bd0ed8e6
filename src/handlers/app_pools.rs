use axum::{extract::State, Json};
use std::sync::Arc;

use crate::correlator::Correlation;
use crate::AppState;

use super::AppError;

// ─── GET /api/perfcounter/app-pools ──────────────────────────────
/// Worker-process instances and the app pool each one serves. Enumeration
/// failures come back as an empty list with a `diagnostic`, not an error.

pub async fn list_app_pools(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Correlation>, AppError> {
    let host = state.host.clone();
    let correlator = state.correlator.clone();
    let correlation = tokio::task::spawn_blocking(move || correlator.correlate(host.as_ref()))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(correlation))
}
