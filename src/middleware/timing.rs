use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time-us");
const SERVER_TIMING: HeaderName = HeaderName::from_static("server-timing");

/// Tags every request with an id and reports how long the handler took:
///
///   x-request-id        echoed from the client, or a fresh v4 uuid
///   x-response-time-us  handler wall time in microseconds
///   server-timing       the same, as `handler;dur=<ms>`
///
/// API requests run inside a `request` span carrying the id, so counter
/// reads and sampling logs can be tied back to the call that caused them.
pub async fn timing_middleware(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let api = path.starts_with("/api/");

    let span = tracing::info_span!("request", id = %request_id, %method, %path);
    let start = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;
    let elapsed = start.elapsed();

    let headers = response.headers_mut();
    if let Ok(val) = HeaderValue::from_str(&request_id) {
        headers.insert(REQUEST_ID, val);
    }
    headers.insert(RESPONSE_TIME, HeaderValue::from(elapsed.as_micros() as u64));
    if let Ok(val) = format!("handler;dur={:.3}", elapsed.as_secs_f64() * 1000.0).parse() {
        headers.insert(SERVER_TIMING, val);
    }

    // Static files are not logged. For the SSE route this is setup time only.
    if api {
        let status = response.status().as_u16();
        let us = elapsed.as_micros() as u64;
        span.in_scope(|| {
            if status >= 500 {
                tracing::warn!(status, us, "request failed");
            } else {
                tracing::info!(status, us, "request served");
            }
        });
    }

    response
}
