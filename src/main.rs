use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod config;
mod correlator;
mod counters;
mod handlers;
mod metrics;
mod middleware;
mod server;

use config::{Config, HostKind, SamplingLimits};
use correlator::InstanceCorrelator;
use counters::{CounterHost, SystemHost};
use metrics::{RunRegistry, SampleCollector};

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// The counter subsystem every read and enumeration goes through.
    pub host: Arc<dyn CounterHost>,

    /// One-shot batch reader over `host`.
    pub collector: SampleCollector,

    /// Worker-process → app-pool join settings.
    pub correlator: InstanceCorrelator,

    /// Sampling runs started in the background.
    pub runs: RunRegistry,

    /// Bounds on interval and duration of sampling requests.
    pub sampling: SamplingLimits,
}

impl AppState {
    pub fn new(
        host: Arc<dyn CounterHost>,
        correlator: InstanceCorrelator,
        sampling: SamplingLimits,
    ) -> Self {
        Self {
            collector: SampleCollector::new(host.clone()),
            host,
            correlator,
            runs: RunRegistry::new(sampling.keep_finished_runs),
            sampling,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_json);

    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   📈  PERFORMANCE COUNTER OBSERVATORY            ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    // ── 1. Pick the counter host ─────────────────────────────────
    let host: Arc<dyn CounterHost> = match config.host {
        HostKind::System => Arc::new(SystemHost::new()),
        HostKind::Demo => Arc::new(counters::demo::host(config.demo_seed)),
    };
    tracing::info!(host = ?config.host, "counter host selected");

    // ── 2. Build shared state ────────────────────────────────────
    let state = Arc::new(AppState::new(
        host,
        InstanceCorrelator::new(config.correlator_settings()),
        config.sampling_limits(),
    ));

    // ── 3. Build Axum router ─────────────────────────────────────
    let app = server::create_router(state.clone(), &config.static_dir);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}, is it already in use?", config.bind))?;

    let port = config.bind.port();
    println!("Server listening on http://localhost:{port}");
    println!("Categories      → http://localhost:{port}/api/perfcounter/categories");
    println!("App pools       → http://localhost:{port}/api/perfcounter/app-pools");
    println!("Live stream     → http://localhost:{port}/api/perfcounter/counters/stream?path=...");
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    if !state.runs.is_empty() {
        tracing::info!(runs = state.runs.len(), "cancelling background sampling runs");
        state.runs.cancel_all();
    }
    Ok(())
}
