//! Sensor Routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;
use crate::AppState;
use storage::{Reading, Sensor};

/// Metric returned when the query string does not name one
pub const DEFAULT_METRIC: &str = "humedad";

/// Row cap applied when the query string carries no `limit`
pub const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for the recent readings endpoint
#[derive(Debug, Deserialize, PartialEq)]
pub struct ReadingsQuery {
    /// Metric name to filter on
    #[serde(default = "default_metric")]
    pub metric: String,
    /// Maximum number of rows to return
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_metric() -> String {
    DEFAULT_METRIC.to_string()
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

fn record(op: &'static str) {
    metrics::counter!("sensores_requests_total", "op" => op).increment(1);
}

/// List all sensors
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Sensor>>, ApiError> {
    record("list");
    let sensors = state.store.list().await?;
    Ok(Json(sensors))
}

/// Get a sensor by id
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Sensor>, ApiError> {
    record("get");
    state
        .store
        .get(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// Create a sensor
pub async fn create(
    State(state): State<AppState>,
    Json(sensor): Json<Sensor>,
) -> Result<Json<Sensor>, ApiError> {
    record("create");
    let saved = state.store.save(sensor).await?;
    info!("Created sensor {:?}", saved.id);
    Ok(Json(saved))
}

/// Replace a sensor; the path id wins over any id in the body
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(mut sensor): Json<Sensor>,
) -> Result<Json<Sensor>, ApiError> {
    record("update");
    sensor.id = Some(id);
    let updated = state
        .store
        .update(id, sensor)
        .await?
        .ok_or(ApiError::NotFound)?;
    info!("Updated sensor {}", id);
    Ok(Json(updated))
}

/// Delete a sensor
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    record("delete");
    if !state.store.delete(id).await? {
        return Err(ApiError::NotFound);
    }
    info!("Deleted sensor {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Most recent readings of one metric for a sensor, newest first.
///
/// An unknown sensor id yields an empty array.
pub async fn recent_readings(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<ReadingsQuery>,
) -> Result<Json<Vec<Reading>>, ApiError> {
    record("recent_readings");
    if params.limit < 0 {
        return Err(ApiError::BadRequest(format!(
            "limit must not be negative, got {}",
            params.limit
        )));
    }

    let readings = state
        .store
        .recent_readings(id, &params.metric, params.limit)
        .await?;
    Ok(Json(readings))
}
