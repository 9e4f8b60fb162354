//! Database schema bootstrap
//!
//! Creates `core.sensores` and `telemetry.lecturas` when they are missing.
//! Safe to run on every startup; existing objects are left untouched.

use crate::StorageError;
use sqlx::PgPool;
use tracing::info;

const STATEMENTS: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS core",
    "CREATE SCHEMA IF NOT EXISTS telemetry",
    r#"
    CREATE TABLE IF NOT EXISTS core.sensores (
        id          BIGSERIAL PRIMARY KEY,
        nombre      TEXT,
        tipo        TEXT,
        modelo      TEXT,
        device_id   TEXT,
        cultivo_id  BIGINT,
        activo      BOOLEAN,
        atributos   JSONB       NOT NULL DEFAULT '{}'::jsonb,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS telemetry.lecturas (
        sensor_id   BIGINT           NOT NULL,
        ts          TIMESTAMPTZ      NOT NULL DEFAULT now(),
        metric      TEXT             NOT NULL,
        value       DOUBLE PRECISION NOT NULL,
        metadata    JSONB
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_lecturas_sensor_metric_ts
        ON telemetry.lecturas (sensor_id, metric, ts DESC)
    "#,
];

/// Create or update the database schema (idempotent).
pub async fn create_schema(pool: &PgPool) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;

    for statement in STATEMENTS {
        sqlx::query(*statement).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    info!("Database schema ready");
    Ok(())
}
