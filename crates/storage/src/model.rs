//! Sensor and reading records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A monitoring device registered in `core.sensores`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    /// Assigned by storage on insert
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modelo: Option<String>,
    /// Hardware identifier the ingestion pipeline matches readings against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Crop this sensor belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cultivo_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activo: Option<bool>,
    /// Assigned by storage on insert, never changed afterwards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Any other field the client sent; stored as JSONB
    #[serde(flatten)]
    pub atributos: Map<String, Value>,
}

/// One telemetry observation from `telemetry.lecturas`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reading {
    pub ts: DateTime<Utc>,
    pub metric: String,
    pub value: f64,
    pub metadata: Option<Value>,
}
