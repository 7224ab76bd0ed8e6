use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::counters::{CounterHost, MetricSpec};

// ─── Configuration ───────────────────────────────────────────────

/// Names of the two categories being joined and of the counter that
/// carries the shared process id.
#[derive(Debug, Clone)]
pub struct CorrelatorSettings {
    /// Category whose instances are named `<pid>_<appPool>`.
    pub worker_category: String,
    /// Aggregate instance of `worker_category`, skipped.
    pub aggregate_instance: String,
    /// Generic per-process category.
    pub process_category: String,
    /// Counter of `process_category` holding the process id.
    pub process_id_counter: String,
    /// Only process instances starting with this are candidates.
    pub worker_prefix: String,
}

impl Default for CorrelatorSettings {
    fn default() -> Self {
        Self {
            worker_category: "W3SVC_W3WP".into(),
            aggregate_instance: "__Total".into(),
            process_category: "Process".into(),
            process_id_counter: "ID Process".into(),
            worker_prefix: "w3wp".into(),
        }
    }
}

// ─── Public types ────────────────────────────────────────────────

/// A worker-process instance matched to its app pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    pub process_id: i64,
    /// Instance name in the process category, e.g. `w3wp#1`.
    #[serde(rename = "instanceKey")]
    pub worker_instance: String,
    /// App pool name, verbatim.
    #[serde(rename = "displayName")]
    pub app_pool: String,
}

/// Candidates left out of a correlation, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedCandidates {
    /// Worker-category instances not shaped `<pid>_<appPool>`.
    pub unparsable: usize,
    /// Worker processes whose process id could not be read.
    pub unreadable: usize,
    /// Worker processes whose process id has no app pool instance.
    pub unmatched: usize,
}

/// Result of one correlation snapshot. Never an error: enumeration
/// failures leave `app_pools` empty and set `diagnostic`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlation {
    pub app_pools: Vec<InstanceRecord>,
    pub dropped: DroppedCandidates,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl Correlation {
    fn failed(diagnostic: String) -> Self {
        Self {
            app_pools: Vec::new(),
            dropped: DroppedCandidates::default(),
            diagnostic: Some(diagnostic),
        }
    }

    /// App pool owning the given worker instance, if any.
    #[cfg(test)]
    pub fn app_pool_of(&self, worker_instance: &str) -> Option<&str> {
        self.app_pools
            .iter()
            .find(|r| r.worker_instance == worker_instance)
            .map(|r| r.app_pool.as_str())
    }
}

// ─── InstanceCorrelator ──────────────────────────────────────────

/// Joins worker-process instances to app pools through the live process id.
///
/// Holds only configuration; every call takes a fresh snapshot of the host.
#[derive(Debug, Clone, Default)]
pub struct InstanceCorrelator {
    settings: CorrelatorSettings,
}

impl InstanceCorrelator {
    pub fn new(settings: CorrelatorSettings) -> Self {
        Self { settings }
    }

    pub fn correlate(&self, host: &dyn CounterHost) -> Correlation {
        let s = &self.settings;
        let mut dropped = DroppedCandidates::default();

        // ── 1. pid → app pool from the worker category ──────────────
        let worker_instances = match host.instances(&s.worker_category) {
            Ok(instances) => instances,
            Err(e) => {
                tracing::warn!(category = %s.worker_category, error = %e, "cannot enumerate worker instances");
                return Correlation::failed(format!(
                    "cannot enumerate '{}': {e}",
                    s.worker_category
                ));
            }
        };

        let mut pool_by_pid: HashMap<i64, String> = HashMap::new();
        for instance in worker_instances {
            if instance == s.aggregate_instance {
                continue;
            }
            match split_worker_instance(&instance) {
                Some((pid, pool)) => {
                    pool_by_pid.insert(pid, pool.to_owned());
                }
                None => {
                    tracing::debug!(%instance, "worker instance is not <pid>_<appPool>");
                    dropped.unparsable += 1;
                }
            }
        }

        // ── 2. live pid of every worker process ─────────────────────
        let process_instances = match host.instances(&s.process_category) {
            Ok(instances) => instances,
            Err(e) => {
                tracing::warn!(category = %s.process_category, error = %e, "cannot enumerate processes");
                return Correlation::failed(format!(
                    "cannot enumerate '{}': {e}",
                    s.process_category
                ));
            }
        };

        // ── 3. join ─────────────────────────────────────────────────
        let mut app_pools = Vec::new();
        let mut seen = HashSet::new();
        for instance in process_instances {
            if !instance.starts_with(&s.worker_prefix) || !seen.insert(instance.clone()) {
                continue;
            }

            let pid = MetricSpec::new(&s.process_category, &s.process_id_counter, Some(&instance))
                .map_err(|e| e.to_string())
                .and_then(|spec| host.read_raw(&spec).map_err(|e| e.to_string()));
            let pid = match pid {
                Ok(pid) => pid,
                Err(error) => {
                    tracing::debug!(%instance, %error, "cannot read worker process id");
                    dropped.unreadable += 1;
                    continue;
                }
            };

            match pool_by_pid.get(&pid) {
                Some(pool) => app_pools.push(InstanceRecord {
                    process_id: pid,
                    worker_instance: instance,
                    app_pool: pool.clone(),
                }),
                None => {
                    tracing::debug!(%instance, pid, "worker process has no app pool instance");
                    dropped.unmatched += 1;
                }
            }
        }

        Correlation {
            app_pools,
            dropped,
            diagnostic: None,
        }
    }
}

/// Splits `<pid>_<appPool>` on the first `_` only; the pool name keeps any
/// further underscores.
fn split_worker_instance(instance: &str) -> Option<(i64, &str)> {
    let (pid, pool) = instance.split_once('_')?;
    let pid = pid.parse().ok()?;
    (!pool.is_empty()).then_some((pid, pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::memory::{CounterSource, InMemoryHost};

    fn worker(host: InMemoryHost, instance: &str) -> InMemoryHost {
        host.instance("W3SVC_W3WP", instance, "Requests / Sec", CounterSource::Fixed(1.0))
    }

    fn process(host: InMemoryHost, instance: &str, pid: f64) -> InMemoryHost {
        host.instance("Process", instance, "ID Process", CounterSource::Fixed(pid))
    }

    fn basic_host() -> InMemoryHost {
        let host = InMemoryHost::new(0);
        let host = worker(host, "1234_Pool1");
        let host = worker(host, "5678_Pool2");
        let host = worker(host, "__Total");
        let host = process(host, "w3wp", 1234.0);
        process(host, "w3wp#1", 9999.0)
    }

    #[test]
    fn joins_on_live_process_id() {
        let correlation = InstanceCorrelator::default().correlate(&basic_host());
        assert_eq!(
            correlation.app_pools,
            vec![InstanceRecord {
                process_id: 1234,
                worker_instance: "w3wp".into(),
                app_pool: "Pool1".into(),
            }]
        );
        assert_eq!(correlation.dropped.unmatched, 1);
        assert_eq!(correlation.diagnostic, None);
    }

    #[test]
    fn splits_on_first_underscore_only() {
        assert_eq!(split_worker_instance("42_Orders_Api_v2"), Some((42, "Orders_Api_v2")));
        assert_eq!(split_worker_instance("42"), None);
        assert_eq!(split_worker_instance("abc_Pool"), None);
        assert_eq!(split_worker_instance("42_"), None);

        let host = worker(InMemoryHost::new(0), "77_Billing_Svc");
        let host = process(host, "w3wp", 77.0);
        let correlation = InstanceCorrelator::default().correlate(&host);
        assert_eq!(correlation.app_pool_of("w3wp"), Some("Billing_Svc"));
    }

    #[test]
    fn counts_dropped_candidates() {
        let host = worker(basic_host(), "not-a-pid");
        let host = process(host, "svchost", 1234.0);
        let host = host.instance(
            "Process",
            "w3wp#2",
            "ID Process",
            CounterSource::Fail("process exited".into()),
        );

        let correlation = InstanceCorrelator::default().correlate(&host);
        assert_eq!(correlation.app_pools.len(), 1);
        assert_eq!(
            correlation.dropped,
            DroppedCandidates {
                unparsable: 1,
                unreadable: 1,
                unmatched: 1,
            }
        );
        assert_eq!(host.open_handles(), 0);
    }

    #[test]
    fn enumeration_failure_is_soft() {
        let host = basic_host().deny("W3SVC_W3WP");
        let correlation = InstanceCorrelator::default().correlate(&host);
        assert!(correlation.app_pools.is_empty());
        assert!(correlation.diagnostic.unwrap().contains("W3SVC_W3WP"));

        let correlation = InstanceCorrelator::default().correlate(&InMemoryHost::new(0));
        assert!(correlation.app_pools.is_empty());
        assert!(correlation.diagnostic.is_some());
    }

    #[test]
    fn process_exiting_mid_snapshot_drops_silently() {
        let host = basic_host();
        host.remove_instance("Process", "w3wp");
        let correlation = InstanceCorrelator::default().correlate(&host);
        assert!(correlation.app_pools.is_empty());
        assert!(correlation.diagnostic.is_none());
    }

    #[test]
    fn repeated_calls_agree() {
        let host = basic_host();
        let correlator = InstanceCorrelator::default();
        assert_eq!(correlator.correlate(&host), correlator.correlate(&host));
    }

    #[test]
    fn custom_settings_are_honoured() {
        let host = InMemoryHost::new(0)
            .instance("Workers", "10_api", "x", CounterSource::Fixed(0.0))
            .instance("Proc", "php-fpm", "Pid", CounterSource::Fixed(10.0));
        let correlator = InstanceCorrelator::new(CorrelatorSettings {
            worker_category: "Workers".into(),
            aggregate_instance: "_all".into(),
            process_category: "Proc".into(),
            process_id_counter: "Pid".into(),
            worker_prefix: "php".into(),
        });
        assert_eq!(correlator.correlate(&host).app_pool_of("php-fpm"), Some("api"));
    }
}
