//! Storage Layer
//!
//! Persistence for sensors and their telemetry readings. Handlers talk to the
//! [`SensorStore`] trait; [`PgRepository`] backs it with PostgreSQL and
//! [`MemoryRepository`] keeps everything in process.

mod memory;
mod model;
mod postgres;
pub mod schema;

pub use memory::MemoryRepository;
pub use model::{Reading, Sensor};
pub use postgres::PgRepository;

use async_trait::async_trait;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    DatabaseError(#[from] sqlx::Error),
    #[error("Lock error: {0}")]
    LockError(String),
    #[error("No sensor ids left to assign")]
    IdsExhausted,
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Persistence operations used by the request handlers
#[async_trait]
pub trait SensorStore: Send + Sync {
    /// Run a trivial round-trip against the backing store
    async fn ping(&self) -> Result<(), StorageError>;

    /// All sensors, ordered by id
    async fn list(&self) -> Result<Vec<Sensor>, StorageError>;

    /// Look up a single sensor
    async fn get(&self, id: i64) -> Result<Option<Sensor>, StorageError>;

    /// Insert when `sensor.id` is absent, insert-or-update otherwise.
    async fn save(&self, sensor: Sensor) -> Result<Sensor, StorageError>;

    /// Overwrite an existing sensor in one statement.
    ///
    /// Returns `None` without writing anything when no row has `id`. The
    /// stored identifier is always `id`, whatever `sensor.id` carries.
    async fn update(&self, id: i64, sensor: Sensor) -> Result<Option<Sensor>, StorageError>;

    /// Delete a sensor, returning whether a row was removed
    async fn delete(&self, id: i64) -> Result<bool, StorageError>;

    /// Most recent readings of `metric` for a sensor, newest first
    async fn recent_readings(
        &self,
        sensor_id: i64,
        metric: &str,
        limit: i64,
    ) -> Result<Vec<Reading>, StorageError>;
}
