pub mod forecasts;
pub mod health;
pub mod uploads;

use std::sync::Arc;

use tokio::sync::Notify;

use crate::config::{PipelineConfig, StorageConfig};
use crate::db::PgJobStore;

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub store: PgJobStore,
    /// Wakes the workers when a job is enqueued.
    pub job_notify: Arc<Notify>,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
}
