/// Job persistence. The `forecast_jobs` table doubles as the work queue:
/// workers claim the oldest pending row with `FOR UPDATE SKIP LOCKED`, so a
/// job is claimed by exactly one worker even under concurrent polling.
/// The trait seam exists so the worker loop and its tests can run against an
/// in-memory store with the same claim semantics.
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ForecastJob, SelectionMode};

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &ForecastJob) -> anyhow::Result<ForecastJob>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<ForecastJob>>;

    /// Atomically move the oldest pending job to processing and return it.
    /// Returns `None` when the queue is empty.
    async fn claim_next(&self) -> anyhow::Result<Option<ForecastJob>>;

    /// Transition a processing job to completed. A no-op for jobs not in the
    /// processing state, so stale workers cannot clobber a terminal row.
    async fn complete(
        &self,
        id: Uuid,
        selected_strategy: &str,
        selection_mode: SelectionMode,
        results: serde_json::Value,
    ) -> anyhow::Result<()>;

    /// Transition a processing job to failed with a machine-readable class
    /// and a human-readable message.
    async fn fail(&self, id: Uuid, error_class: &str, error_message: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ForecastJob>, i64), sqlx::Error> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM forecast_jobs")
            .fetch_one(&self.pool)
            .await?;

        let jobs = sqlx::query_as::<_, ForecastJob>(
            "SELECT * FROM forecast_jobs ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((jobs, total))
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &ForecastJob) -> anyhow::Result<ForecastJob> {
        let row = sqlx::query_as::<_, ForecastJob>(
            r#"INSERT INTO forecast_jobs
               (id, upload_id, file_path, time_column, target_column, exogenous_columns,
                horizon, model_choice, status, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               RETURNING *"#,
        )
        .bind(job.id)
        .bind(job.upload_id)
        .bind(&job.file_path)
        .bind(&job.time_column)
        .bind(&job.target_column)
        .bind(&job.exogenous_columns)
        .bind(job.horizon)
        .bind(job.model_choice)
        .bind(job.status)
        .bind(job.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<ForecastJob>> {
        let row = sqlx::query_as::<_, ForecastJob>("SELECT * FROM forecast_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn claim_next(&self) -> anyhow::Result<Option<ForecastJob>> {
        let row = sqlx::query_as::<_, ForecastJob>(
            r#"UPDATE forecast_jobs
               SET status = 'processing', started_at = now()
               WHERE id = (
                   SELECT id FROM forecast_jobs
                   WHERE status = 'pending'
                   ORDER BY created_at
                   LIMIT 1
                   FOR UPDATE SKIP LOCKED
               )
               RETURNING *"#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn complete(
        &self,
        id: Uuid,
        selected_strategy: &str,
        selection_mode: SelectionMode,
        results: serde_json::Value,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"UPDATE forecast_jobs
               SET status = 'completed', selected_strategy = $2, selection_mode = $3,
                   results = $4, finished_at = now()
               WHERE id = $1 AND status = 'processing'"#,
        )
        .bind(id)
        .bind(selected_strategy)
        .bind(selection_mode)
        .bind(results)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(&self, id: Uuid, error_class: &str, error_message: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"UPDATE forecast_jobs
               SET status = 'failed', error_class = $2, error_message = $3, finished_at = now()
               WHERE id = $1 AND status = 'processing'"#,
        )
        .bind(id)
        .bind(error_class)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// In-memory store mirroring the Postgres claim and transition semantics,
/// for worker tests.
#[cfg(test)]
pub mod memory {
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::models::JobStatus;

    #[derive(Default)]
    pub struct MemoryJobStore {
        jobs: Mutex<Vec<ForecastJob>>,
    }

    #[async_trait]
    impl JobStore for MemoryJobStore {
        async fn insert(&self, job: &ForecastJob) -> anyhow::Result<ForecastJob> {
            let mut jobs = self.jobs.lock().unwrap();
            jobs.push(job.clone());
            Ok(job.clone())
        }

        async fn get(&self, id: Uuid) -> anyhow::Result<Option<ForecastJob>> {
            let jobs = self.jobs.lock().unwrap();
            Ok(jobs.iter().find(|j| j.id == id).cloned())
        }

        async fn claim_next(&self) -> anyhow::Result<Option<ForecastJob>> {
            let mut jobs = self.jobs.lock().unwrap();
            let next = jobs
                .iter_mut()
                .filter(|j| j.status == JobStatus::Pending)
                .min_by_key(|j| j.created_at);
            Ok(next.map(|job| {
                job.status = JobStatus::Processing;
                job.started_at = Some(Utc::now());
                job.clone()
            }))
        }

        async fn complete(
            &self,
            id: Uuid,
            selected_strategy: &str,
            selection_mode: SelectionMode,
            results: serde_json::Value,
        ) -> anyhow::Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(job) = jobs
                .iter_mut()
                .find(|j| j.id == id && j.status == JobStatus::Processing)
            {
                job.status = JobStatus::Completed;
                job.selected_strategy = Some(selected_strategy.to_string());
                job.selection_mode = Some(selection_mode);
                job.results = Some(results);
                job.finished_at = Some(Utc::now());
            }
            Ok(())
        }

        async fn fail(
            &self,
            id: Uuid,
            error_class: &str,
            error_message: &str,
        ) -> anyhow::Result<()> {
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(job) = jobs
                .iter_mut()
                .find(|j| j.id == id && j.status == JobStatus::Processing)
            {
                job.status = JobStatus::Failed;
                job.error_class = Some(error_class.to_string());
                job.error_message = Some(error_message.to_string());
                job.finished_at = Some(Utc::now());
            }
            Ok(())
        }
    }
}
