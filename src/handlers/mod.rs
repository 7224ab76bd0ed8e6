pub mod app_pools;
pub mod categories;
pub mod runs;
pub mod values;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::counters::{CounterError, CounterHost, MalformedPath, MetricSpec};
use crate::AppState;

// ─── Shared request shapes ───────────────────────────────────────

/// `?instanceName=` on the category routes.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceQuery {
    #[serde(default, alias = "InstanceName")]
    pub instance_name: Option<String>,
}

impl InstanceQuery {
    /// An empty `instanceName` means no instance.
    pub fn instance(&self) -> Option<&str> {
        self.instance_name.as_deref().filter(|i| !i.is_empty())
    }
}

/// One metric in a request body: either a wire path or the three fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterRequest {
    #[serde(default, alias = "Path")]
    pub path: Option<String>,
    #[serde(default, alias = "CategoryName")]
    pub category_name: Option<String>,
    #[serde(default, alias = "CounterName")]
    pub counter_name: Option<String>,
    #[serde(default, alias = "InstanceName")]
    pub instance_name: Option<String>,
}

impl CounterRequest {
    pub fn to_spec(&self) -> Result<MetricSpec, MalformedPath> {
        if let Some(path) = &self.path {
            return MetricSpec::parse(path);
        }
        MetricSpec::new(
            self.category_name.as_deref().unwrap_or_default(),
            self.counter_name.as_deref().unwrap_or_default(),
            self.instance_name.as_deref().filter(|i| !i.is_empty()),
        )
    }
}

/// Converts a batch, skipping entries that do not describe a metric.
pub fn specs_from_requests(requests: &[CounterRequest]) -> Vec<MetricSpec> {
    requests
        .iter()
        .filter_map(|req| match req.to_spec() {
            Ok(spec) => Some(spec),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed counter request");
                None
            }
        })
        .collect()
}

/// Runs a host call on the blocking pool.
pub async fn on_host<T, F>(state: &AppState, f: F) -> Result<T, AppError>
where
    F: FnOnce(&dyn CounterHost) -> Result<T, CounterError> + Send + 'static,
    T: Send + 'static,
{
    let host = state.host.clone();
    tokio::task::spawn_blocking(move || f(host.as_ref()))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(AppError::from)
}

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Counter(CounterError),
    BadRequest(String),
    /// A JSON body that could not be read or deserialized.
    Body(JsonRejection),
    Internal(String),
}

impl From<CounterError> for AppError {
    fn from(e: CounterError) -> Self {
        Self::Counter(e)
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        Self::Body(e)
    }
}

impl From<MalformedPath> for AppError {
    fn from(e: MalformedPath) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            // Host failures are reported as a bad request, as the counter
            // API always has: the caller asked for something the host lacks
            Self::Counter(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Body(rejection) => (rejection.status(), rejection.body_text()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accepts_path_or_fields() {
        let by_path: CounterRequest =
            serde_json::from_str(r#"{"path":"\\Process(w3wp)\\ID Process"}"#).unwrap();
        let by_fields: CounterRequest = serde_json::from_str(
            r#"{"CategoryName":"Process","CounterName":"ID Process","InstanceName":"w3wp"}"#,
        )
        .unwrap();
        assert_eq!(by_path.to_spec().unwrap(), by_fields.to_spec().unwrap());
    }

    #[test]
    fn empty_instance_means_none() {
        let req = CounterRequest {
            category_name: Some("Memory".into()),
            counter_name: Some("Available MBytes".into()),
            instance_name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(req.to_spec().unwrap().instance(), None);
    }

    #[test]
    fn malformed_requests_are_skipped() {
        let reqs = vec![
            CounterRequest {
                path: Some("CategoryOnly".into()),
                ..Default::default()
            },
            CounterRequest {
                path: Some(r"\Memory\Available MBytes".into()),
                ..Default::default()
            },
            CounterRequest::default(),
        ];
        let specs = specs_from_requests(&reqs);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].path(), r"\Memory\Available MBytes");
    }
}
