use std::sync::Arc;

use crate::counters::{CounterHost, MetricSpec};

use super::{Reading, SampleResult};

// ─── Public types ────────────────────────────────────────────────

/// One-shot batch reader.
/// Every spec is read on its own; a failure only ever affects its own entry.
#[derive(Clone)]
pub struct SampleCollector {
    host: Arc<dyn CounterHost>,
}

// ─── SampleCollector impl ────────────────────────────────────────

impl SampleCollector {
    pub fn new(host: Arc<dyn CounterHost>) -> Self {
        Self { host }
    }

    /// Reads every spec once. The output has the same length and order as
    /// `specs`.
    ///
    /// Reads run in parallel on the blocking pool, each opening and
    /// releasing its own counter handle. All of them are joined before
    /// this returns.
    pub async fn collect(&self, specs: &[MetricSpec]) -> Vec<SampleResult> {
        let reads: Vec<_> = specs
            .iter()
            .map(|spec| {
                let host = self.host.clone();
                let target = spec.clone();
                (
                    spec.clone(),
                    tokio::task::spawn_blocking(move || host.read(&target)),
                )
            })
            .collect();

        let mut results = Vec::with_capacity(reads.len());
        for (spec, read) in reads {
            let reading = match read.await {
                Ok(Ok(value)) => Reading::Value(value),
                Ok(Err(e)) => Reading::Error(e.to_string()),
                // A panicking backend is still just this spec's failure
                Err(e) => Reading::Error(format!("counter read aborted: {e}")),
            };
            results.push(SampleResult::new(spec, reading));
        }
        tracing::debug!(
            metrics = results.len(),
            failed = results.iter().filter(|r| r.error().is_some()).count(),
            "batch collected"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::memory::{CounterSource, InMemoryHost};
    use crate::counters::{CounterError, CounterHandle, CategoryKind};

    fn spec(path: &str) -> MetricSpec {
        MetricSpec::parse(path).unwrap()
    }

    #[tokio::test]
    async fn keeps_order_and_isolates_failures() {
        let host = Arc::new(
            InMemoryHost::new(0).single("Memory", "Available MBytes", CounterSource::Fixed(512.0)),
        );
        let collector = SampleCollector::new(host.clone());

        let results = collector
            .collect(&[spec(r"\Memory\Available MBytes"), spec(r"\Memory\No Such Counter")])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, r"\Memory\Available MBytes");
        assert_eq!(results[0].value(), Some(512.0));
        assert_eq!(results[0].error(), None);
        assert_eq!(results[1].path, r"\Memory\No Such Counter");
        assert_eq!(results[1].value(), None);
        assert!(results[1].error().unwrap().contains("No Such Counter"));
        assert_eq!(host.open_handles(), 0);
    }

    #[tokio::test]
    async fn empty_batch_yields_nothing() {
        let collector = SampleCollector::new(Arc::new(InMemoryHost::new(0)));
        assert!(collector.collect(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_specs_each_get_a_result() {
        let host = Arc::new(
            InMemoryHost::new(0).instance("Process", "w3wp", "ID Process", CounterSource::Fixed(7.0)),
        );
        let collector = SampleCollector::new(host);
        let s = spec(r"\Process(w3wp)\ID Process");
        let results = collector.collect(&[s.clone(), s]).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.value() == Some(7.0)));
    }

    struct PanickyHost;

    impl CounterHost for PanickyHost {
        fn categories(&self) -> Result<Vec<String>, CounterError> {
            Ok(Vec::new())
        }
        fn category_kind(&self, _: &str) -> Result<CategoryKind, CounterError> {
            Ok(CategoryKind::SingleInstance)
        }
        fn instances(&self, _: &str) -> Result<Vec<String>, CounterError> {
            Ok(Vec::new())
        }
        fn counters(&self, _: &str, _: Option<&str>) -> Result<Vec<String>, CounterError> {
            Ok(Vec::new())
        }
        fn open(&self, spec: &MetricSpec) -> Result<Box<dyn CounterHandle>, CounterError> {
            if spec.counter() == "boom" {
                panic!("backend bug");
            }
            Err(CounterError::Unavailable("nothing here".into()))
        }
    }

    #[tokio::test]
    async fn a_panicking_read_does_not_sink_the_batch() {
        let collector = SampleCollector::new(Arc::new(PanickyHost));
        let results = collector
            .collect(&[spec(r"\A\boom"), spec(r"\A\fine")])
            .await;
        assert_eq!(results.len(), 2);
        assert!(results[0].error().unwrap().contains("aborted"));
        assert_eq!(results[1].error(), Some("counter unavailable: nothing here"));
    }

    #[test]
    fn serializes_value_or_error() {
        let ok = SampleResult::new(spec(r"\Memory\Available MBytes"), Reading::Value(1.5));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["path"], r"\Memory\Available MBytes");
        assert_eq!(json["categoryName"], "Memory");
        assert_eq!(json["value"], 1.5);
        assert!(json.get("errorMessage").is_none());

        let err = SampleResult::new(spec(r"\Memory\X"), Reading::Error("gone".into()));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["errorMessage"], "gone");
        assert!(json.get("value").is_none());
    }
}
