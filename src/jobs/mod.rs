/// Background workers that drain the forecast job queue. Workers are woken
/// by a notify when a job is enqueued, with a periodic poll as a backstop
/// for jobs enqueued by other processes. Model fitting runs on the blocking
/// pool so the async runtime stays responsive.
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::config::{PipelineConfig, WorkersConfig};
use crate::db::JobStore;
use crate::ml::select::NoViableModel;
use crate::ml::{assemble, preprocess, select, strategies};
use crate::models::{ForecastJob, SelectionMode};

/// Terminal failure of one job, with a machine-readable class persisted
/// alongside the message so callers can distinguish bad input from a broken
/// pipeline.
#[derive(Debug, Error)]
pub enum JobFailure {
    #[error(transparent)]
    Data(#[from] preprocess::DataError),
    #[error(transparent)]
    NoViableModel(#[from] NoViableModel),
    #[error("{0}")]
    Infrastructure(String),
}

impl JobFailure {
    pub fn class(&self) -> &'static str {
        match self {
            Self::Data(_) => "data_error",
            Self::NoViableModel(_) => "no_viable_model",
            Self::Infrastructure(_) => "infrastructure_error",
        }
    }
}

pub fn spawn_workers<S>(
    store: Arc<S>,
    workers: WorkersConfig,
    pipeline: PipelineConfig,
    notify: Arc<Notify>,
) where
    S: JobStore + 'static,
{
    for worker_id in 0..workers.worker_count {
        let store = Arc::clone(&store);
        let pipeline = pipeline.clone();
        let workers = workers.clone();
        let notify = Arc::clone(&notify);
        tokio::spawn(async move {
            worker_loop(worker_id, store, workers, pipeline, notify).await;
        });
    }
    info!(count = workers.worker_count, "Forecast workers started");
}

async fn worker_loop<S: JobStore>(
    worker_id: usize,
    store: Arc<S>,
    workers: WorkersConfig,
    pipeline: PipelineConfig,
    notify: Arc<Notify>,
) {
    let mut ticker = interval(Duration::from_secs(workers.poll_interval_secs));
    loop {
        tokio::select! {
            _ = notify.notified() => {}
            _ = ticker.tick() => {}
        }

        // Drain the queue before sleeping again.
        loop {
            let claimed = match store.claim_next().await {
                Ok(job) => job,
                Err(e) => {
                    error!(worker_id, error = %e, "Claim query failed");
                    break;
                }
            };
            let Some(job) = claimed else { break };

            info!(worker_id, job_id = %job.id, "Processing forecast job");
            run_claimed_job(store.as_ref(), &job, &workers, &pipeline).await;
        }
    }
}

/// Process a claimed job and persist the outcome, retrying the final store
/// write so a transient database blip does not strand the row in
/// `processing`.
pub async fn run_claimed_job<S: JobStore>(
    store: &S,
    job: &ForecastJob,
    workers: &WorkersConfig,
    pipeline: &PipelineConfig,
) {
    match process_job(job, pipeline).await {
        Ok((selected, mode, results)) => {
            let write = with_retries(workers, || {
                store.complete(job.id, &selected, mode, results.clone())
            })
            .await;
            match write {
                Ok(()) => {
                    info!(job_id = %job.id, strategy = %selected, mode = %mode, "Forecast job completed")
                }
                Err(e) => error!(job_id = %job.id, error = %e, "Failed to persist completion"),
            }
        }
        Err(failure) => {
            warn!(job_id = %job.id, class = failure.class(), error = %failure, "Forecast job failed");
            let message = failure.to_string();
            let write =
                with_retries(workers, || store.fail(job.id, failure.class(), &message)).await;
            if let Err(e) = write {
                error!(job_id = %job.id, error = %e, "Failed to persist failure");
            }
        }
    }
}

async fn with_retries<F, Fut>(workers: &WorkersConfig, mut op: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let attempts = workers.store_retry_attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(attempt, error = %e, "Store write failed, retrying");
                last_err = Some(e);
                tokio::time::sleep(Duration::from_millis(workers.store_retry_backoff_ms)).await;
            }
        }
    }
    Err(last_err.expect("at least one attempt was made"))
}

/// The pipeline for one job: read the uploaded CSV, build the series, fan
/// out the strategies, pick a winner and assemble the result document.
async fn process_job(
    job: &ForecastJob,
    pipeline: &PipelineConfig,
) -> Result<(String, SelectionMode, serde_json::Value), JobFailure> {
    let raw = tokio::fs::read(&job.file_path)
        .await
        .map_err(|e| JobFailure::Infrastructure(format!("reading {}: {e}", job.file_path)))?;

    let (headers, rows) = parse_csv(&raw)?;

    let job = job.clone();
    let pipeline = pipeline.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let dataset = preprocess::build(
            &headers,
            &rows,
            &job.time_column,
            &job.target_column,
            &job.exogenous(),
            job.horizon as usize,
            &pipeline,
        )?;
        let results = strategies::run_all(&dataset, job.horizon as usize);
        let (selected, mode) = select::select(&results, job.model_choice)?;
        let result = assemble::assemble(&job, &dataset, results, &selected, mode);
        Ok::<_, JobFailure>((selected, mode, result))
    })
    .await
    .map_err(|_| JobFailure::Infrastructure("model fitting task panicked".into()))?;

    let (selected, mode, result) = outcome?;
    let results = serde_json::to_value(&result)
        .map_err(|e| JobFailure::Infrastructure(format!("serializing results: {e}")))?;
    Ok((selected, mode, results))
}

fn parse_csv(raw: &[u8]) -> Result<(Vec<String>, Vec<Vec<String>>), JobFailure> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| JobFailure::Infrastructure(format!("reading CSV header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| JobFailure::Infrastructure(format!("reading CSV row: {e}")))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok((headers, rows))
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use chrono::{Duration as ChronoDuration, NaiveDate};
    use uuid::Uuid;

    use super::*;
    use crate::db::jobs::memory::MemoryJobStore;
    use crate::models::{ForecastRequest, JobStatus, ModelChoice};

    fn write_csv(rows: &[String]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "date,sales").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn daily_rows(values: impl Iterator<Item = f64>) -> Vec<String> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .enumerate()
            .map(|(i, v)| format!("{},{v}", start + ChronoDuration::days(i as i64)))
            .collect()
    }

    fn request(model: ModelChoice, horizon: u32) -> ForecastRequest {
        ForecastRequest {
            job_id: Uuid::new_v4(),
            time_column: "date".into(),
            target_column: "sales".into(),
            exogenous_columns: vec![],
            horizon,
            model,
        }
    }

    async fn enqueue_and_run(
        store: &MemoryJobStore,
        file: &tempfile::NamedTempFile,
        model: ModelChoice,
        horizon: u32,
    ) -> ForecastJob {
        let req = request(model, horizon);
        let job =
            ForecastJob::from_request(&req, file.path().to_string_lossy().into_owned());
        store.insert(&job).await.unwrap();

        let claimed = store.claim_next().await.unwrap().unwrap();
        run_claimed_job(
            store,
            &claimed,
            &WorkersConfig::default(),
            &PipelineConfig::default(),
        )
        .await;

        store.get(job.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn completes_a_clean_daily_series() {
        let rows = daily_rows((0..60).map(|i| 100.0 + i as f64 * 1.5 + (i % 4) as f64));
        let file = write_csv(&rows);
        let store = MemoryJobStore::default();

        let row = enqueue_and_run(&store, &file, ModelChoice::Auto, 14).await;

        assert_eq!(row.status, JobStatus::Completed);
        assert!(row.finished_at.is_some());
        let selected = row.selected_strategy.clone().unwrap();
        assert!(["arima", "ets", "xgboost"].contains(&selected.as_str()));

        let results = row.results.unwrap();
        assert_eq!(results["historical"].as_array().unwrap().len(), 60);
        assert_eq!(results["forecast"].as_array().unwrap().len(), 14);
        assert_eq!(results["selected_strategy"], selected);
    }

    #[tokio::test]
    async fn non_numeric_target_fails_with_data_error() {
        let mut rows = daily_rows((0..30).map(|i| i as f64));
        rows[10] = "2024-01-11,N/A".into();
        let file = write_csv(&rows);
        let store = MemoryJobStore::default();

        let row = enqueue_and_run(&store, &file, ModelChoice::Auto, 7).await;

        assert_eq!(row.status, JobStatus::Failed);
        assert_eq!(row.error_class.as_deref(), Some("data_error"));
        assert!(row.error_message.unwrap().contains("N/A"));
        assert!(row.results.is_none());
    }

    #[tokio::test]
    async fn missing_file_fails_with_infrastructure_error() {
        let store = MemoryJobStore::default();
        let req = request(ModelChoice::Auto, 7);
        let job = ForecastJob::from_request(&req, "/nonexistent/input.csv".into());
        store.insert(&job).await.unwrap();

        let claimed = store.claim_next().await.unwrap().unwrap();
        run_claimed_job(
            &store,
            &claimed,
            &WorkersConfig::default(),
            &PipelineConfig::default(),
        )
        .await;

        let row = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(row.status, JobStatus::Failed);
        assert_eq!(row.error_class.as_deref(), Some("infrastructure_error"));
    }

    #[tokio::test]
    async fn constant_series_completes_by_elimination() {
        let rows = daily_rows((0..40).map(|_| 42.0));
        let file = write_csv(&rows);
        let store = MemoryJobStore::default();

        let row = enqueue_and_run(&store, &file, ModelChoice::Auto, 7).await;

        assert_eq!(row.status, JobStatus::Completed);
        // only the boosted model survives a constant series
        assert_eq!(row.selected_strategy.as_deref(), Some("xgboost"));
        assert_eq!(row.selection_mode, Some(SelectionMode::Auto));
    }

    #[tokio::test]
    async fn manual_choice_on_degenerate_series_records_fallback() {
        let rows = daily_rows((0..40).map(|_| 42.0));
        let file = write_csv(&rows);
        let store = MemoryJobStore::default();

        let row = enqueue_and_run(&store, &file, ModelChoice::Arima, 7).await;

        assert_eq!(row.status, JobStatus::Completed);
        assert_eq!(row.selected_strategy.as_deref(), Some("xgboost"));
        assert_eq!(row.selection_mode, Some(SelectionMode::Fallback));
    }

    #[tokio::test]
    async fn each_job_is_claimed_exactly_once() {
        let store = MemoryJobStore::default();
        for _ in 0..3 {
            let job = ForecastJob::from_request(&request(ModelChoice::Auto, 7), "x.csv".into());
            store.insert(&job).await.unwrap();
        }

        let mut claimed = Vec::new();
        while let Some(job) = store.claim_next().await.unwrap() {
            claimed.push(job.id);
        }
        claimed.sort();
        claimed.dedup();
        assert_eq!(claimed.len(), 3);
    }
}
