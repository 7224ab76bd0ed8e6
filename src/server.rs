use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::handlers;
use crate::metrics::stream;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router` with all routes, middleware, and static serving.
pub fn create_router(state: Arc<AppState>, static_dir: &Path) -> Router {
    let api = Router::new()
        // ── Enumeration ─────────────────────────────────────────
        .route("/categories", get(handlers::categories::list_categories))
        .route(
            "/categories/:category/instances",
            get(handlers::categories::list_instances),
        )
        .route(
            "/categories/:category/counters",
            get(handlers::categories::list_counter_paths),
        )
        .route(
            "/categories/:category/counter-names",
            get(handlers::categories::list_counter_names),
        )
        // ── Single readings ─────────────────────────────────────
        .route(
            "/categories/:category/counters/:counter",
            get(handlers::categories::counter_value),
        )
        .route("/value", get(handlers::categories::value_by_path))
        // ── Batches and time series ─────────────────────────────
        .route("/counters/values", post(handlers::values::collect_values))
        .route(
            "/counters/values/over-time",
            post(handlers::values::collect_over_time),
        )
        .route("/counters/stream", get(stream::counters_stream))
        .route("/runs", post(handlers::runs::start_run))
        .route(
            "/runs/:id",
            get(handlers::runs::run_status).delete(handlers::runs::cancel_run),
        )
        // ── Worker processes ────────────────────────────────────
        .route("/app-pools", get(handlers::app_pools::list_app_pools));

    Router::new()
        .nest("/api/perfcounter", api)
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Serve the dashboard directory ───────────────────────
        .fallback_service(ServeDir::new(static_dir))
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}
