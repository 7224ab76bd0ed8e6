use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::metrics::sampler::{self, SamplePlan, SamplingRun};
use crate::metrics::SampleResult;
use crate::AppState;

use super::{specs_from_requests, AppError, CounterRequest};

// ─── Request types ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverTimeRequest {
    #[serde(alias = "CounterRequests")]
    pub counter_requests: Vec<CounterRequest>,

    /// Total run length; ticks = duration / interval. Zero or negative
    /// gives a run with no ticks.
    #[serde(alias = "DurationInSeconds")]
    pub duration_in_seconds: i64,

    /// Defaults to the configured sampling interval
    #[serde(default, alias = "IntervalMs")]
    pub interval_ms: Option<u64>,
}

impl OverTimeRequest {
    /// Validates against the configured limits and derives the tick plan.
    pub fn plan(&self, state: &AppState) -> Result<SamplePlan, AppError> {
        let limits = &state.sampling;
        let duration = Duration::from_secs(u64::try_from(self.duration_in_seconds).unwrap_or(0));
        if duration > limits.max_duration {
            return Err(AppError::BadRequest(format!(
                "durationInSeconds must be at most {}",
                limits.max_duration.as_secs()
            )));
        }

        let interval = self
            .interval_ms
            .map(Duration::from_millis)
            .unwrap_or(limits.default_interval);
        if interval < limits.min_interval {
            return Err(AppError::BadRequest(format!(
                "intervalMs must be at least {}",
                limits.min_interval.as_millis()
            )));
        }

        Ok(SamplePlan::from_duration(duration, interval))
    }
}

// ─── POST /api/perfcounter/counters/values ───────────────────────
/// One reading per metric. Entries that are not a valid metric are skipped;
/// every other entry gets a value or an error, in request order.

pub async fn collect_values(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Vec<CounterRequest>>, JsonRejection>,
) -> Result<Json<Vec<SampleResult>>, AppError> {
    let Json(requests) = body?;
    let specs = specs_from_requests(&requests);
    Ok(Json(state.collector.collect(&specs).await))
}

// ─── POST /api/perfcounter/counters/values/over-time ─────────────
/// Samples inline and answers when the run ends. The run is cancelled if
/// the client disconnects first.

pub async fn collect_over_time(
    State(state): State<Arc<AppState>>,
    body: Result<Json<OverTimeRequest>, JsonRejection>,
) -> Result<Json<SamplingRun>, AppError> {
    let Json(request) = body?;
    let plan = request.plan(&state)?;
    let specs = specs_from_requests(&request.counter_requests);

    let cancel = CancellationToken::new();
    // Dropped with this future when the client goes away
    let _disconnect = cancel.clone().drop_guard();

    let collector = state.collector.clone();
    let run = tokio::spawn(async move {
        sampler::sample(&collector, &specs, plan, &cancel).await
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(run))
}
