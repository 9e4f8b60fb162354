//! PostgreSQL repository

use crate::{schema, Reading, Sensor, SensorStore, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Row shape of `core.sensores`
#[derive(sqlx::FromRow)]
struct SensorRow {
    id: i64,
    nombre: Option<String>,
    tipo: Option<String>,
    modelo: Option<String>,
    device_id: Option<String>,
    cultivo_id: Option<i64>,
    activo: Option<bool>,
    atributos: Json<Map<String, Value>>,
    created_at: DateTime<Utc>,
}

impl From<SensorRow> for Sensor {
    fn from(row: SensorRow) -> Self {
        Self {
            id: Some(row.id),
            nombre: row.nombre,
            tipo: row.tipo,
            modelo: row.modelo,
            device_id: row.device_id,
            cultivo_id: row.cultivo_id,
            activo: row.activo,
            created_at: Some(row.created_at),
            atributos: row.atributos.0,
        }
    }
}

/// Repository backed by a PostgreSQL connection pool
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
    bootstrap_schema: bool,
    /// Set once [`schema::create_schema`] has succeeded
    schema: Arc<OnceCell<()>>,
}

impl PgRepository {
    /// Repository over tables that are managed elsewhere
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            bootstrap_schema: false,
            schema: Arc::new(OnceCell::new()),
        }
    }

    /// Repository that creates its tables before the first statement it runs.
    ///
    /// A failed bootstrap is retried on the next call, so a database that comes
    /// up after the server still ends up with its schema.
    pub fn with_schema_bootstrap(pool: PgPool) -> Self {
        Self {
            bootstrap_schema: true,
            ..Self::new(pool)
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Whether the tables are known to exist (always true without bootstrap)
    pub fn schema_ready(&self) -> bool {
        !self.bootstrap_schema || self.schema.initialized()
    }

    async fn ensure_schema(&self) -> Result<(), StorageError> {
        if !self.bootstrap_schema {
            return Ok(());
        }

        self.schema
            .get_or_try_init(|| async {
                info!("Bootstrapping database schema");
                schema::create_schema(&self.pool).await
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SensorStore for PgRepository {
    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        // Not ready until the tables the handlers query exist
        self.ensure_schema().await
    }

    async fn list(&self) -> Result<Vec<Sensor>, StorageError> {
        self.ensure_schema().await?;

        let rows = sqlx::query_as::<_, SensorRow>(
            r#"
            SELECT id, nombre, tipo, modelo, device_id, cultivo_id, activo, atributos, created_at
            FROM core.sensores
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!("Listed {} sensors", rows.len());
        Ok(rows.into_iter().map(Sensor::from).collect())
    }

    async fn get(&self, id: i64) -> Result<Option<Sensor>, StorageError> {
        self.ensure_schema().await?;

        let row = sqlx::query_as::<_, SensorRow>(
            r#"
            SELECT id, nombre, tipo, modelo, device_id, cultivo_id, activo, atributos, created_at
            FROM core.sensores
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Sensor::from))
    }

    async fn save(&self, sensor: Sensor) -> Result<Sensor, StorageError> {
        self.ensure_schema().await?;

        let Some(id) = sensor.id else {
            let row = sqlx::query_as::<_, SensorRow>(
                r#"
                INSERT INTO core.sensores (nombre, tipo, modelo, device_id, cultivo_id, activo, atributos)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, nombre, tipo, modelo, device_id, cultivo_id, activo, atributos, created_at
                "#,
            )
            .bind(&sensor.nombre)
            .bind(&sensor.tipo)
            .bind(&sensor.modelo)
            .bind(&sensor.device_id)
            .bind(sensor.cultivo_id)
            .bind(sensor.activo)
            .bind(Json(&sensor.atributos))
            .fetch_one(&self.pool)
            .await?;

            debug!("Inserted sensor {}", row.id);
            return Ok(row.into());
        };

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, SensorRow>(
            r#"
            INSERT INTO core.sensores (id, nombre, tipo, modelo, device_id, cultivo_id, activo, atributos)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                nombre = EXCLUDED.nombre,
                tipo = EXCLUDED.tipo,
                modelo = EXCLUDED.modelo,
                device_id = EXCLUDED.device_id,
                cultivo_id = EXCLUDED.cultivo_id,
                activo = EXCLUDED.activo,
                atributos = EXCLUDED.atributos
            RETURNING id, nombre, tipo, modelo, device_id, cultivo_id, activo, atributos, created_at
            "#,
        )
        .bind(id)
        .bind(&sensor.nombre)
        .bind(&sensor.tipo)
        .bind(&sensor.modelo)
        .bind(&sensor.device_id)
        .bind(sensor.cultivo_id)
        .bind(sensor.activo)
        .bind(Json(&sensor.atributos))
        .fetch_one(&mut *tx)
        .await?;

        // Explicit ids bypass the serial; move it past them
        sqlx::query(
            r#"
            SELECT setval(
                pg_get_serial_sequence('core.sensores', 'id'),
                GREATEST((SELECT MAX(id) FROM core.sensores), 1)
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!("Upserted sensor {}", id);
        Ok(row.into())
    }

    async fn update(&self, id: i64, sensor: Sensor) -> Result<Option<Sensor>, StorageError> {
        self.ensure_schema().await?;

        let row = sqlx::query_as::<_, SensorRow>(
            r#"
            UPDATE core.sensores SET
                nombre = $2,
                tipo = $3,
                modelo = $4,
                device_id = $5,
                cultivo_id = $6,
                activo = $7,
                atributos = $8
            WHERE id = $1
            RETURNING id, nombre, tipo, modelo, device_id, cultivo_id, activo, atributos, created_at
            "#,
        )
        .bind(id)
        .bind(&sensor.nombre)
        .bind(&sensor.tipo)
        .bind(&sensor.modelo)
        .bind(&sensor.device_id)
        .bind(sensor.cultivo_id)
        .bind(sensor.activo)
        .bind(Json(&sensor.atributos))
        .fetch_optional(&self.pool)
        .await?;

        debug!("Update sensor {}: found={}", id, row.is_some());
        Ok(row.map(Sensor::from))
    }

    async fn delete(&self, id: i64) -> Result<bool, StorageError> {
        self.ensure_schema().await?;

        let result = sqlx::query("DELETE FROM core.sensores WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        debug!("Delete sensor {}: rows={}", id, result.rows_affected());
        Ok(result.rows_affected() > 0)
    }

    async fn recent_readings(
        &self,
        sensor_id: i64,
        metric: &str,
        limit: i64,
    ) -> Result<Vec<Reading>, StorageError> {
        self.ensure_schema().await?;

        let readings = sqlx::query_as::<_, Reading>(
            r#"
            SELECT ts, metric, value, metadata
            FROM telemetry.lecturas
            WHERE sensor_id = $1 AND metric = $2
            ORDER BY ts DESC
            LIMIT $3
            "#,
        )
        .bind(sensor_id)
        .bind(metric)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(
            "Fetched {} '{}' readings for sensor {}",
            readings.len(),
            metric,
            sensor_id
        );
        Ok(readings)
    }
}
