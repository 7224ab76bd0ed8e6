use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::metrics::runs::RunStatus;
use crate::metrics::SamplingRun;
use crate::AppState;

use super::values::OverTimeRequest;
use super::{specs_from_requests, AppError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStarted {
    pub run_id: Uuid,
    pub ticks: u32,
    pub metrics: usize,
}

// ─── POST /api/perfcounter/runs ──────────────────────────────────

pub async fn start_run(
    State(state): State<Arc<AppState>>,
    body: Result<Json<OverTimeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RunStarted>), AppError> {
    let Json(request) = body?;
    let plan = request.plan(&state)?;
    let specs = specs_from_requests(&request.counter_requests);
    let metrics = specs.len();

    let run_id = state.runs.start(state.collector.clone(), specs, plan);

    Ok((
        StatusCode::ACCEPTED,
        Json(RunStarted {
            run_id,
            ticks: plan.ticks,
            metrics,
        }),
    ))
}

// ─── GET /api/perfcounter/runs/:id ───────────────────────────────

pub async fn run_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunStatus>, AppError> {
    match state.runs.status(id).await {
        Some(Ok(status)) => Ok(Json(status)),
        Some(Err(e)) => Err(AppError::Internal(e.to_string())),
        None => Err(AppError::NotFound(format!("run '{id}' not found"))),
    }
}

// ─── DELETE /api/perfcounter/runs/:id ────────────────────────────

pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SamplingRun>, AppError> {
    match state.runs.cancel(id).await {
        Some(Ok(run)) => Ok(Json(run)),
        Some(Err(e)) => Err(AppError::Internal(e.to_string())),
        None => Err(AppError::NotFound(format!("run '{id}' not found"))),
    }
}
