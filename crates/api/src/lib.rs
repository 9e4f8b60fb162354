//! Sensor Management API Server
//!
//! REST API over agricultural sensors and their telemetry readings, plus
//! liveness and readiness probes.

use anyhow::Context;
use axum::{
    http::HeaderValue,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod error;
pub mod routes;
pub mod settings;

pub use error::ApiError;
pub use settings::{LogFormat, Settings};

use storage::{MemoryRepository, PgRepository, SensorStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Sensor and reading persistence
    pub store: Arc<dyn SensorStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn SensorStore>) -> Self {
        Self { store }
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    create_router_with_cors(state, cors_layer(&[]))
}

fn create_router_with_cors(state: AppState, cors: CorsLayer) -> Router {
    use routes::{health, sensors};

    Router::new()
        .route("/health", get(health::health))
        .route("/readiness", get(health::readiness))
        .route("/api/sensores", get(sensors::list).post(sensors::create))
        .route(
            "/api/sensores/:id",
            get(sensors::get).put(sensors::update).delete(sensors::delete),
        )
        .route(
            "/api/sensores/:id/ultimas-lecturas",
            get(sensors::recent_readings),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// CORS policy; an empty origin list allows any origin
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

/// Initialize logging
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_logging(settings: &settings::LoggingSettings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .context("Invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);
    match settings.format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    }
    .context("Failed to set tracing subscriber")
}

/// Build the store selected by the database settings
pub async fn connect_store(settings: &settings::DatabaseSettings) -> anyhow::Result<Arc<dyn SensorStore>> {
    if settings.in_memory {
        warn!("Using in-memory store; data is lost on restart");
        return Ok(Arc::new(MemoryRepository::new()));
    }

    // Lazy so the server comes up, and reports not ready, while the database is down
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout())
        .connect_lazy(&settings.url)
        .context("Invalid database URL")?;

    // Tables are created on first use and retried until the database answers
    let repository = if settings.create_schema {
        PgRepository::with_schema_bootstrap(pool)
    } else {
        PgRepository::new(pool)
    };

    Ok(Arc::new(repository))
}

/// Run the server until Ctrl-C or SIGTERM
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    if let Some(listen) = &settings.metrics.listen {
        let addr: SocketAddr = listen.parse().context("Invalid metrics.listen address")?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Prometheus metrics on http://{}/metrics", addr);
    }

    let store = connect_store(&settings.database).await?;
    let app = create_router_with_cors(
        AppState::new(store),
        cors_layer(&settings.server.allowed_origins),
    );

    let addr = settings.server.addr();
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
