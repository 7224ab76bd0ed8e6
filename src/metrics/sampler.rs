use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::counters::MetricSpec;

use super::{Reading, SampleCollector};

// ─── Public types ────────────────────────────────────────────────

/// How often and how many times to collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplePlan {
    pub interval: Duration,
    pub ticks: u32,
}

impl SamplePlan {
    /// `floor(duration / interval)` ticks. A zero interval gives zero ticks.
    pub fn from_duration(duration: Duration, interval: Duration) -> Self {
        let ticks = if interval.is_zero() {
            0
        } else {
            u32::try_from(duration.as_nanos() / interval.as_nanos()).unwrap_or(u32::MAX)
        };
        Self { interval, ticks }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Completed,
    Cancelled,
}

/// One tick's entry in a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub tick: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub reading: Reading,
}

/// Every reading of one spec during a run, in tick order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    pub path: String,
    #[serde(flatten)]
    pub spec: MetricSpec,
    pub samples: Vec<SeriesPoint>,
}

impl TimeSeries {
    fn new(spec: MetricSpec) -> Self {
        Self {
            path: spec.path(),
            spec,
            samples: Vec::new(),
        }
    }
}

/// What a finished run hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingRun {
    pub run_id: Uuid,
    pub state: RunState,
    pub ticks_completed: u32,
    pub series: Vec<TimeSeries>,
}

#[cfg(test)]
impl SamplingRun {
    pub fn series_for(&self, spec: &MetricSpec) -> Option<&TimeSeries> {
        self.series.iter().find(|s| &s.spec == spec)
    }
}

// ─── Public entry point ──────────────────────────────────────────

/// Collects `specs` once per tick, starting immediately, until `plan.ticks`
/// ticks are done or `cancel` fires.
///
/// Duplicate specs share one series. Every tick appends exactly one point
/// to every series, error or not, so series stay tick-aligned. Cancellation
/// is checked before each tick and during the wait; a read already in
/// flight always finishes.
pub async fn sample(
    collector: &SampleCollector,
    specs: &[MetricSpec],
    plan: SamplePlan,
    cancel: &CancellationToken,
) -> SamplingRun {
    let run_id = Uuid::new_v4();

    let mut series: Vec<TimeSeries> = Vec::with_capacity(specs.len());
    for spec in specs {
        if !series.iter().any(|s| &s.spec == spec) {
            series.push(TimeSeries::new(spec.clone()));
        }
    }
    let batch: Vec<MetricSpec> = series.iter().map(|s| s.spec.clone()).collect();

    tracing::debug!(%run_id, metrics = batch.len(), ticks = plan.ticks, interval_ms = plan.interval.as_millis() as u64, "sampling run started");

    let mut state = RunState::Completed;
    let mut ticks_completed = 0;

    for tick in 0..plan.ticks {
        if cancel.is_cancelled() {
            state = RunState::Cancelled;
            break;
        }

        let timestamp = Utc::now();
        // Results come back in batch order, which is series order
        let results = collector.collect(&batch).await;
        for (s, result) in series.iter_mut().zip(results) {
            s.samples.push(SeriesPoint {
                tick,
                timestamp,
                reading: result.reading,
            });
        }
        ticks_completed += 1;

        if tick + 1 == plan.ticks {
            break;
        }
        if cancel.is_cancelled() {
            state = RunState::Cancelled;
            break;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                state = RunState::Cancelled;
                break;
            }
            _ = tokio::time::sleep(plan.interval) => {}
        }
    }

    tracing::debug!(%run_id, ?state, ticks_completed, "sampling run finished");

    SamplingRun {
        run_id,
        state,
        ticks_completed,
        series,
    }
}
