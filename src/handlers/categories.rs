use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::counters::{CategoryKind, CounterError, CounterHost, MetricSpec};
use crate::metrics::{Reading, SampleResult};
use crate::AppState;

use super::{on_host, AppError, InstanceQuery};

// ─── GET /api/perfcounter/categories ─────────────────────────────

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, AppError> {
    let categories = on_host(&state, |host| host.categories()).await?;
    Ok(Json(categories))
}

// ─── GET /api/perfcounter/categories/:category/instances ─────────

pub async fn list_instances(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    let instances = on_host(&state, move |host| host.instances(&category)).await?;
    Ok(Json(instances))
}

// ─── GET /api/perfcounter/categories/:category/counters ──────────
/// Full metric paths. Multi-instance categories list every instance's
/// counters, or only `instanceName`'s when given.

pub async fn list_counter_paths(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Query(query): Query<InstanceQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    let instance = query.instance().map(str::to_owned);
    let paths = on_host(&state, move |host| {
        counter_paths(host, &category, instance.as_deref())
    })
    .await?;
    Ok(Json(paths))
}

fn counter_paths(
    host: &dyn CounterHost,
    category: &str,
    instance: Option<&str>,
) -> Result<Vec<String>, CounterError> {
    let instances = match host.category_kind(category)? {
        CategoryKind::SingleInstance => vec![None],
        CategoryKind::MultiInstance => {
            let all = host.instances(category)?;
            match instance {
                Some(i) if !all.iter().any(|known| known == i) => {
                    return Err(CounterError::InstanceNotFound {
                        category: category.to_owned(),
                        instance: i.to_owned(),
                    })
                }
                Some(i) => vec![Some(i.to_owned())],
                None => all.into_iter().map(Some).collect(),
            }
        }
    };

    let mut paths = Vec::new();
    for instance in instances {
        for counter in host.counters(category, instance.as_deref())? {
            match MetricSpec::new(category, &counter, instance.as_deref()) {
                Ok(spec) => paths.push(spec.path()),
                Err(e) => tracing::warn!(error = %e, "counter has no valid path"),
            }
        }
    }
    Ok(paths)
}

// ─── GET /api/perfcounter/categories/:category/counter-names ─────
/// Bare counter names; multi-instance categories are probed through their
/// first instance.

pub async fn list_counter_names(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    let names = on_host(&state, move |host| match host.category_kind(&category)? {
        CategoryKind::SingleInstance => host.counters(&category, None),
        CategoryKind::MultiInstance => match host.instances(&category)?.first() {
            Some(first) => host.counters(&category, Some(first)),
            None => Ok(Vec::new()),
        },
    })
    .await?;
    Ok(Json(names))
}

// ─── GET /api/perfcounter/categories/:category/counters/:counter ─

pub async fn counter_value(
    State(state): State<Arc<AppState>>,
    Path((category, counter)): Path<(String, String)>,
    Query(query): Query<InstanceQuery>,
) -> Result<Json<f64>, AppError> {
    let spec = MetricSpec::new(&category, &counter, query.instance())?;
    let value = on_host(&state, move |host| host.read(&spec)).await?;
    Ok(Json(value))
}

// ─── GET /api/perfcounter/value?path= ────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: String,
}

/// Single metric by wire path; a malformed path rejects the request.
pub async fn value_by_path(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<SampleResult>, AppError> {
    let spec = MetricSpec::parse(&query.path)?;
    let target = spec.clone();
    let value = on_host(&state, move |host| host.read(&target)).await?;
    Ok(Json(SampleResult::new(spec, Reading::Value(value))))
}
