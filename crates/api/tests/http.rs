//! End-to-end HTTP tests
//!
//! Each test serves the router on an ephemeral port and talks to it with
//! reqwest, backed by the in-memory store.

use api::{create_router, AppState};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use storage::{MemoryRepository, Reading, Sensor, SensorStore, StorageError};

async fn spawn(store: Arc<dyn SensorStore>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(AppState::new(store)))
            .await
            .unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_memory() -> (String, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());
    let base = spawn(repo.clone()).await;
    (base, repo)
}

fn reading(minute: i64, metric: &str, value: f64) -> Reading {
    Reading {
        ts: Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap() + Duration::minutes(minute),
        metric: metric.to_string(),
        value,
        metadata: Some(json!({ "bateria": 90 })),
    }
}

/// Store whose every call fails the way an unreachable database does
struct UnreachableStore;

#[async_trait]
impl SensorStore for UnreachableStore {
    async fn ping(&self) -> Result<(), StorageError> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn list(&self) -> Result<Vec<Sensor>, StorageError> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn get(&self, _id: i64) -> Result<Option<Sensor>, StorageError> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn save(&self, _sensor: Sensor) -> Result<Sensor, StorageError> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn update(&self, _id: i64, _sensor: Sensor) -> Result<Option<Sensor>, StorageError> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn delete(&self, _id: i64) -> Result<bool, StorageError> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn recent_readings(
        &self,
        _sensor_id: i64,
        _metric: &str,
        _limit: i64,
    ) -> Result<Vec<Reading>, StorageError> {
        Err(sqlx::Error::PoolTimedOut.into())
    }
}

#[tokio::test]
async fn test_health() {
    let (base, _) = spawn_memory().await;

    let response = reqwest::get(format!("{base}/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_readiness_ready() {
    let (base, _) = spawn_memory().await;

    let response = reqwest::get(format!("{base}/readiness")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({ "ready": true }));
}

#[tokio::test]
async fn test_readiness_with_unreachable_store() {
    let base = spawn(Arc::new(UnreachableStore)).await;

    let response = reqwest::get(format!("{base}/readiness")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["ready"], false);
    assert_eq!(body["error"], sqlx::Error::PoolTimedOut.to_string());
}

#[tokio::test]
async fn test_storage_failure_is_500() {
    let base = spawn(Arc::new(UnreachableStore)).await;

    let response = reqwest::get(format!("{base}/api/sensores")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_sensor_lifecycle() {
    let (base, _) = spawn_memory().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("{base}/api/sensores"))
        .json(&json!({ "nombre": "Sensor A" }))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["id"], 1);
    assert_eq!(created["nombre"], "Sensor A");

    let fetched = client.get(format!("{base}/api/sensores/1")).send().await.unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(fetched.json::<Value>().await.unwrap(), created);

    let updated = client
        .put(format!("{base}/api/sensores/1"))
        .json(&json!({ "id": 999, "nombre": "Sensor A2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    let updated: Value = updated.json().await.unwrap();
    assert_eq!(updated["id"], 1);
    assert_eq!(updated["nombre"], "Sensor A2");

    let deleted = client.delete(format!("{base}/api/sensores/1")).send().await.unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    assert!(deleted.bytes().await.unwrap().is_empty());

    let gone = client.get(format!("{base}/api/sensores/1")).send().await.unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_with_max_id_keeps_server_healthy() {
    let (base, _) = spawn_memory().await;
    let client = reqwest::Client::new();

    let created = client
        .post(format!("{base}/api/sensores"))
        .json(&json!({ "id": i64::MAX, "nombre": "tope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::OK);
    assert_eq!(created.json::<Value>().await.unwrap()["id"], i64::MAX);

    let exhausted = client
        .post(format!("{base}/api/sensores"))
        .json(&json!({ "nombre": "siguiente" }))
        .send()
        .await
        .unwrap();
    assert_eq!(exhausted.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let ready = reqwest::get(format!("{base}/readiness")).await.unwrap();
    assert_eq!(ready.status(), StatusCode::OK);

    let explicit = client
        .post(format!("{base}/api/sensores"))
        .json(&json!({ "id": 7, "nombre": "explicito" }))
        .send()
        .await
        .unwrap();
    assert_eq!(explicit.status(), StatusCode::OK);

    let listed: Vec<Value> = reqwest::get(format!("{base}/api/sensores"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn test_create_echoes_submitted_fields() {
    let (base, _) = spawn_memory().await;
    let body = json!({
        "nombre": "Sonda norte",
        "tipo": "suelo",
        "modelo": "SM-200",
        "device_id": "esp32-0042",
        "cultivo_id": 3,
        "activo": true,
        "profundidad_cm": 15
    });

    let created: Value = reqwest::Client::new()
        .post(format!("{base}/api/sensores"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(created["id"].is_i64());
    assert!(created["created_at"].is_string());
    for (key, value) in body.as_object().unwrap() {
        assert_eq!(&created[key], value, "field {key}");
    }
}

#[tokio::test]
async fn test_list_returns_all_in_id_order() {
    let (base, repo) = spawn_memory().await;
    for nombre in ["A", "B", "C"] {
        repo.save(Sensor {
            nombre: Some(nombre.to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    }

    let sensors: Vec<Value> = reqwest::get(format!("{base}/api/sensores"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let names: Vec<&str> = sensors.iter().map(|s| s["nombre"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_missing_sensor_is_404_everywhere() {
    let (base, repo) = spawn_memory().await;
    let client = reqwest::Client::new();

    let get = client.get(format!("{base}/api/sensores/42")).send().await.unwrap();
    assert_eq!(get.status(), StatusCode::NOT_FOUND);
    assert!(get.bytes().await.unwrap().is_empty());

    let put = client
        .put(format!("{base}/api/sensores/42"))
        .json(&json!({ "nombre": "fantasma" }))
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), StatusCode::NOT_FOUND);
    assert!(put.bytes().await.unwrap().is_empty());

    let delete = client.delete(format!("{base}/api/sensores/42")).send().await.unwrap();
    assert_eq!(delete.status(), StatusCode::NOT_FOUND);

    // The failed update must not have created anything
    assert_eq!(repo.sensor_count(), 0);
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let (base, repo) = spawn_memory().await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/sensores"))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert_eq!(repo.sensor_count(), 0);
}

#[tokio::test]
async fn test_recent_readings_limit_and_order() {
    let (base, repo) = spawn_memory().await;
    for minute in 0..10 {
        repo.insert_reading(5, reading(minute, "humedad", minute as f64)).unwrap();
    }

    let rows: Vec<Value> = reqwest::get(format!(
        "{base}/api/sensores/5/ultimas-lecturas?metric=humedad&limit=3"
    ))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();

    let values: Vec<f64> = rows.iter().map(|r| r["value"].as_f64().unwrap()).collect();
    assert_eq!(values, vec![9.0, 8.0, 7.0]);
    assert_eq!(rows[0]["metric"], "humedad");
    assert_eq!(rows[0]["metadata"], json!({ "bateria": 90 }));
    assert!(rows[0]["ts"].is_string());
}

#[tokio::test]
async fn test_recent_readings_defaults() {
    let (base, repo) = spawn_memory().await;
    for minute in 0..120 {
        repo.insert_reading(5, reading(minute, "humedad", minute as f64)).unwrap();
    }
    repo.insert_reading(5, reading(500, "temperatura", 30.0)).unwrap();

    let implicit: Vec<Value> = reqwest::get(format!("{base}/api/sensores/5/ultimas-lecturas"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let explicit: Vec<Value> = reqwest::get(format!(
        "{base}/api/sensores/5/ultimas-lecturas?metric=humedad"
    ))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();

    assert_eq!(implicit.len(), 100);
    assert_eq!(implicit, explicit);
    assert!(implicit.iter().all(|r| r["metric"] == "humedad"));
}

#[tokio::test]
async fn test_recent_readings_unknown_sensor_is_empty() {
    let (base, _) = spawn_memory().await;

    let response = reqwest::get(format!("{base}/api/sensores/404/ultimas-lecturas"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.json::<Value>().await.unwrap(), json!([]));
}

#[tokio::test]
async fn test_recent_readings_bad_limit() {
    let (base, _) = spawn_memory().await;

    let negative = reqwest::get(format!("{base}/api/sensores/1/ultimas-lecturas?limit=-1"))
        .await
        .unwrap();
    assert_eq!(negative.status(), StatusCode::BAD_REQUEST);
    assert!(negative.json::<Value>().await.unwrap()["error"].is_string());

    let garbage = reqwest::get(format!("{base}/api/sensores/1/ultimas-lecturas?limit=diez"))
        .await
        .unwrap();
    assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);
}
