//! In-memory store
//!
//! Keeps sensors and readings behind a mutex. Used by the test suites and by
//! `database.in_memory` deployments that have no PostgreSQL at hand.

use crate::{Reading, Sensor, SensorStore, StorageError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Default)]
struct Tables {
    /// Sensors keyed by id; BTreeMap keeps `list` in id order
    sensores: BTreeMap<i64, Sensor>,
    /// (sensor_id, reading) in insertion order
    lecturas: Vec<(i64, Reading)>,
    /// Next id handed out on insert
    next_id: i64,
}

/// Repository held entirely in process memory
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    /// Create an empty in-memory repository
    pub fn new() -> Self {
        info!("Creating in-memory repository");
        Self {
            tables: Mutex::new(Tables {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.tables
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }

    /// Append a reading for `sensor_id`.
    ///
    /// Readings are produced by the ingestion pipeline in production; this is
    /// the seeding hook for tests and local runs.
    pub fn insert_reading(&self, sensor_id: i64, reading: Reading) -> Result<(), StorageError> {
        let mut tables = self.lock()?;
        tables.lecturas.push((sensor_id, reading));
        Ok(())
    }

    /// Get total sensor count
    pub fn sensor_count(&self) -> usize {
        self.tables.lock().map(|t| t.sensores.len()).unwrap_or(0)
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SensorStore for MemoryRepository {
    async fn ping(&self) -> Result<(), StorageError> {
        self.lock().map(|_| ())
    }

    async fn list(&self) -> Result<Vec<Sensor>, StorageError> {
        let tables = self.lock()?;
        Ok(tables.sensores.values().cloned().collect())
    }

    async fn get(&self, id: i64) -> Result<Option<Sensor>, StorageError> {
        let tables = self.lock()?;
        Ok(tables.sensores.get(&id).cloned())
    }

    async fn save(&self, mut sensor: Sensor) -> Result<Sensor, StorageError> {
        let mut tables = self.lock()?;

        let id = match sensor.id {
            Some(id) => id,
            // The counter only lands on a used id once it has saturated at i64::MAX
            None if tables.sensores.contains_key(&tables.next_id) => {
                return Err(StorageError::IdsExhausted);
            }
            None => tables.next_id,
        };
        // Keep the counter ahead of explicitly chosen ids
        tables.next_id = tables.next_id.max(id.saturating_add(1));

        sensor.id = Some(id);
        sensor.created_at = tables
            .sensores
            .get(&id)
            .and_then(|existing| existing.created_at)
            .or_else(|| Some(Utc::now()));

        tables.sensores.insert(id, sensor.clone());
        debug!("Saved sensor {}", id);
        Ok(sensor)
    }

    async fn update(&self, id: i64, mut sensor: Sensor) -> Result<Option<Sensor>, StorageError> {
        let mut tables = self.lock()?;

        let Some(existing) = tables.sensores.get_mut(&id) else {
            return Ok(None);
        };

        sensor.id = Some(id);
        sensor.created_at = existing.created_at;
        *existing = sensor.clone();
        debug!("Updated sensor {}", id);
        Ok(Some(sensor))
    }

    async fn delete(&self, id: i64) -> Result<bool, StorageError> {
        let mut tables = self.lock()?;
        let removed = tables.sensores.remove(&id).is_some();
        debug!("Delete sensor {}: removed={}", id, removed);
        Ok(removed)
    }

    async fn recent_readings(
        &self,
        sensor_id: i64,
        metric: &str,
        limit: i64,
    ) -> Result<Vec<Reading>, StorageError> {
        let tables = self.lock()?;

        let mut readings: Vec<Reading> = tables
            .lecturas
            .iter()
            .filter(|(sid, r)| *sid == sensor_id && r.metric == metric)
            .map(|(_, r)| r.clone())
            .collect();

        readings.sort_by(|a, b| b.ts.cmp(&a.ts));
        readings.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(readings)
    }
}
