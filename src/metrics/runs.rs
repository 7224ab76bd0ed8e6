use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::counters::MetricSpec;

use super::sampler::{self, SamplePlan, SamplingRun};
use super::SampleCollector;

/// A sampling run started in the background and polled later.
struct BackgroundRun {
    started: Instant,
    cancel: CancellationToken,
    handle: JoinHandle<SamplingRun>,
}

/// Progress report for `GET /runs/:id`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum RunStatus {
    Running {
        #[serde(rename = "runId")]
        run_id: Uuid,
    },
    Finished { run: SamplingRun },
}

/// Background sampling runs keyed by id.
///
/// Runs share nothing but this index: each one owns its own cancellation
/// token and series. A finished run is handed out once and then forgotten.
/// Finished runs nobody collects are kept up to `keep_finished`, oldest
/// dropped first.
pub struct RunRegistry {
    runs: Mutex<HashMap<Uuid, BackgroundRun>>,
    keep_finished: usize,
}

impl RunRegistry {
    pub fn new(keep_finished: usize) -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            keep_finished,
        }
    }

    pub fn start(
        &self,
        collector: SampleCollector,
        specs: Vec<MetricSpec>,
        plan: SamplePlan,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut run = sampler::sample(&collector, &specs, plan, &token).await;
            run.run_id = id;
            run
        });

        {
            let mut runs = self.runs.lock();
            reclaim_finished(&mut runs, self.keep_finished);
            runs.insert(
                id,
                BackgroundRun {
                    started: Instant::now(),
                    cancel,
                    handle,
                },
            );
        }
        tracing::info!(run_id = %id, ticks = plan.ticks, active = self.len(), "background sampling run started");
        id
    }

    /// `None` for unknown ids. A finished run is removed and returned.
    pub async fn status(&self, id: Uuid) -> Option<Result<RunStatus, tokio::task::JoinError>> {
        let finished = {
            let mut runs = self.runs.lock();
            reclaim_finished(&mut runs, self.keep_finished);
            let run = runs.get(&id)?;
            if !run.handle.is_finished() {
                return Some(Ok(RunStatus::Running { run_id: id }));
            }
            runs.remove(&id)?
        };
        Some(finished.handle.await.map(|run| RunStatus::Finished { run }))
    }

    /// Signals the run to stop and waits for it to hand back what it has.
    pub async fn cancel(&self, id: Uuid) -> Option<Result<SamplingRun, tokio::task::JoinError>> {
        let run = self.runs.lock().remove(&id)?;
        run.cancel.cancel();
        tracing::info!(run_id = %id, "background sampling run cancelled");
        Some(run.handle.await)
    }

    pub fn len(&self) -> usize {
        self.runs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.lock().is_empty()
    }

    /// Cancels every run; used on shutdown.
    pub fn cancel_all(&self) {
        for run in self.runs.lock().values() {
            run.cancel.cancel();
        }
    }
}

/// Drops the oldest finished runs beyond `keep`.
fn reclaim_finished(runs: &mut HashMap<Uuid, BackgroundRun>, keep: usize) {
    let mut finished: Vec<(Instant, Uuid)> = runs
        .iter()
        .filter(|(_, run)| run.handle.is_finished())
        .map(|(id, run)| (run.started, *id))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort_unstable();
    let excess = finished.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        runs.remove(&id);
        tracing::debug!(run_id = %id, "uncollected sampling run dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::memory::{CounterSource, InMemoryHost};
    use crate::metrics::sampler::RunState;
    use std::sync::Arc;
    use std::time::Duration;

    fn collector() -> SampleCollector {
        SampleCollector::new(Arc::new(
            InMemoryHost::new(0).single("Memory", "Available MBytes", CounterSource::Fixed(1.0)),
        ))
    }

    fn specs() -> Vec<MetricSpec> {
        vec![MetricSpec::parse(r"\Memory\Available MBytes").unwrap()]
    }

    #[tokio::test]
    async fn finished_runs_are_handed_out_once() {
        let registry = RunRegistry::new(8);
        let id = registry.start(
            collector(),
            specs(),
            SamplePlan { interval: Duration::from_millis(1), ticks: 2 },
        );

        let run = loop {
            match registry.status(id).await.unwrap().unwrap() {
                RunStatus::Running { .. } => tokio::time::sleep(Duration::from_millis(5)).await,
                RunStatus::Finished { run } => break run,
            }
        };
        assert_eq!(run.run_id, id);
        assert_eq!(run.state, RunState::Completed);
        assert_eq!(run.series[0].samples.len(), 2);
        assert!(registry.status(id).await.is_none());
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn cancel_returns_partial_series() {
        let registry = RunRegistry::new(8);
        let id = registry.start(
            collector(),
            specs(),
            SamplePlan { interval: Duration::from_secs(60), ticks: 100 },
        );
        tokio::time::sleep(Duration::from_millis(20)).await;

        let run = registry.cancel(id).await.unwrap().unwrap();
        assert_eq!(run.state, RunState::Cancelled);
        assert_eq!(run.series[0].samples.len(), 1);
        assert!(registry.cancel(id).await.is_none());
    }

    #[tokio::test]
    async fn uncollected_runs_are_reclaimed_oldest_first() {
        let registry = RunRegistry::new(4);
        let one_tick = SamplePlan { interval: Duration::from_millis(1), ticks: 1 };
        let ids: Vec<Uuid> = (0..10)
            .map(|_| registry.start(collector(), specs(), one_tick))
            .collect();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let latest = registry.start(collector(), specs(), one_tick);
        assert_eq!(registry.len(), 5);
        assert!(registry.status(ids[0]).await.is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            registry.status(latest).await,
            Some(Ok(RunStatus::Finished { .. }))
        ));
        assert!(registry.len() <= 4);
    }

    #[tokio::test]
    async fn unknown_ids_are_none() {
        let registry = RunRegistry::new(8);
        assert!(registry.status(Uuid::new_v4()).await.is_none());
    }
}
