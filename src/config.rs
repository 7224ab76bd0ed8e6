use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::correlator::CorrelatorSettings;

/// Which counter subsystem to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HostKind {
    /// Live readings from this machine
    System,
    /// Simulated web server with IIS-style worker processes
    Demo,
}

/// Command-line / environment configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "perfcounter-observatory", version, about = "Performance counter query API")]
pub struct Config {
    /// Address the HTTP API listens on
    #[arg(long, env = "PERFSCOPE_BIND", default_value = "0.0.0.0:22788")]
    pub bind: SocketAddr,

    /// Counter host backend
    #[arg(long, env = "PERFSCOPE_HOST", value_enum, default_value_t = HostKind::System)]
    pub host: HostKind,

    /// Seed for the demo host's simulated readings
    #[arg(long, env = "PERFSCOPE_DEMO_SEED", default_value_t = 42)]
    pub demo_seed: u64,

    /// Directory served for non-API routes (the dashboard)
    #[arg(long, env = "PERFSCOPE_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Default sampling interval for time-series and stream requests
    #[arg(long, env = "PERFSCOPE_SAMPLE_INTERVAL_MS", default_value_t = 1_000)]
    pub sample_interval_ms: u64,

    /// Smallest interval a request may ask for
    #[arg(long, env = "PERFSCOPE_MIN_INTERVAL_MS", default_value_t = 100)]
    pub min_interval_ms: u64,

    /// Longest time-series run a request may ask for
    #[arg(long, env = "PERFSCOPE_MAX_SAMPLE_SECS", default_value_t = 300)]
    pub max_sample_secs: u64,

    /// Finished background runs kept for collection before the oldest go
    #[arg(long, env = "PERFSCOPE_KEEP_FINISHED_RUNS", default_value_t = 32)]
    pub keep_finished_runs: usize,

    /// Category whose instances are named `<pid>_<appPool>`
    #[arg(long, env = "PERFSCOPE_WORKER_CATEGORY", default_value = "W3SVC_W3WP")]
    pub worker_category: String,

    /// Aggregate instance of the worker category
    #[arg(long, env = "PERFSCOPE_AGGREGATE_INSTANCE", default_value = "__Total")]
    pub aggregate_instance: String,

    /// Generic per-process category
    #[arg(long, env = "PERFSCOPE_PROCESS_CATEGORY", default_value = "Process")]
    pub process_category: String,

    /// Counter holding the process id
    #[arg(long, env = "PERFSCOPE_PROCESS_ID_COUNTER", default_value = "ID Process")]
    pub process_id_counter: String,

    /// Executable prefix of worker processes
    #[arg(long, env = "PERFSCOPE_WORKER_PREFIX", default_value = "w3wp")]
    pub worker_prefix: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "PERFSCOPE_LOG_JSON")]
    pub log_json: bool,
}

/// Bounds applied to sampling requests.
#[derive(Debug, Clone, Copy)]
pub struct SamplingLimits {
    pub default_interval: Duration,
    pub min_interval: Duration,
    pub max_duration: Duration,
    pub keep_finished_runs: usize,
}

impl Default for SamplingLimits {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(1),
            min_interval: Duration::from_millis(100),
            max_duration: Duration::from_secs(300),
            keep_finished_runs: 32,
        }
    }
}

impl Config {
    pub fn correlator_settings(&self) -> CorrelatorSettings {
        CorrelatorSettings {
            worker_category: self.worker_category.clone(),
            aggregate_instance: self.aggregate_instance.clone(),
            process_category: self.process_category.clone(),
            process_id_counter: self.process_id_counter.clone(),
            worker_prefix: self.worker_prefix.clone(),
        }
    }

    pub fn sampling_limits(&self) -> SamplingLimits {
        SamplingLimits {
            default_interval: Duration::from_millis(self.sample_interval_ms),
            min_interval: Duration::from_millis(self.min_interval_ms),
            max_duration: Duration::from_secs(self.max_sample_secs),
            keep_finished_runs: self.keep_finished_runs,
        }
    }
}
