use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::counters::MetricSpec;
use crate::handlers::AppError;
use crate::AppState;

// ─── GET /api/perfcounter/counters/stream ────────────────────────
/// Server-Sent Events endpoint.
/// `?path=...&path=...[&intervalMs=...]`; pushes the `SampleResult` batch
/// for those paths as JSON once per interval until the client goes away.

pub async fn counters_stream(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Sse<ReceiverStream<Result<Event, Infallible>>>, AppError> {
    let mut specs = Vec::new();
    let mut interval = state.sampling.default_interval;

    for (key, value) in params {
        match key.as_str() {
            "path" => specs.push(value.parse::<MetricSpec>()?),
            "intervalMs" => {
                let ms: u64 = value.parse().map_err(|_| {
                    AppError::BadRequest(format!("intervalMs must be an integer, got {value:?}"))
                })?;
                interval = Duration::from_millis(ms);
            }
            _ => {}
        }
    }
    if specs.is_empty() {
        return Err(AppError::BadRequest("at least one path is required".into()));
    }
    if interval < state.sampling.min_interval {
        return Err(AppError::BadRequest(format!(
            "intervalMs must be at least {}",
            state.sampling.min_interval.as_millis()
        )));
    }

    // Small buffer: a slow client should slow collection, not queue it up
    let (tx, rx) = mpsc::channel(4);
    let collector = state.collector.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let results = collector.collect(&specs).await;
            let json = serde_json::to_string(&results).unwrap_or_default();
            if tx.send(Ok(Event::default().data(json))).await.is_err() {
                tracing::debug!(metrics = specs.len(), "stream client disconnected");
                break;
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
