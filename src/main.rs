mod config;
mod db;
mod errors;
mod handlers;
mod jobs;
mod ml;
mod models;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::Notify;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::db::PgJobStore;
use crate::handlers::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "autocast=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::load()?;
    tracing::info!("Configuration loaded");

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url())
        .await?;
    tracing::info!("Connected to PostgreSQL");

    sqlx::raw_sql(include_str!("../migrations/001_initial_schema.sql"))
        .execute(&pool)
        .await?;
    tracing::info!("Database migrations applied");

    tokio::fs::create_dir_all(&config.storage.data_dir).await?;

    let store = PgJobStore::new(pool.clone());
    let job_notify = Arc::new(Notify::new());

    let state = AppState {
        pool: pool.clone(),
        store: store.clone(),
        job_notify: job_notify.clone(),
        storage: config.storage.clone(),
        pipeline: config.pipeline.clone(),
    };

    jobs::spawn_workers(
        Arc::new(store),
        config.workers.clone(),
        config.pipeline.clone(),
        job_notify,
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/v1/uploads", post(handlers::uploads::create))
        .route("/api/v1/uploads/:id", get(handlers::uploads::get))
        .route("/api/v1/forecasts", post(handlers::forecasts::create).get(handlers::forecasts::list))
        .route("/api/v1/forecasts/:id", get(handlers::forecasts::get))
        .route("/api/v1/forecasts/:id/status", get(handlers::forecasts::status))
        .route("/api/v1/forecasts/:id/export", get(handlers::forecasts::export_csv))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Starting autocast server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
