use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::db::{JobStore, UploadRepo};
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::{
    ForecastJob, ForecastRequest, JobQueryParams, JobStatus, PaginatedResponse, Pagination,
};

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<ForecastRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let upload = UploadRepo::get(&state.pool, req.job_id)
        .await?
        .ok_or_else(|| AppError::not_found("Upload", &req.job_id.to_string()))?;

    req.validate(&upload.column_names())
        .map_err(AppError::bad_request)?;

    let job = ForecastJob::from_request(&req, upload.file_path.clone());
    let job = state.store.insert(&job).await?;
    state.job_notify.notify_one();

    info!(forecast_id = %job.id, upload_id = %upload.id, horizon = job.horizon, "Forecast job queued");

    Ok(Json(json!({
        "forecast_id": job.id,
        "job_id": upload.id,
        "status": "queued",
    })))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let job = fetch(&state, id).await?;

    match job.status {
        JobStatus::Completed => {
            let results = job
                .results
                .ok_or_else(|| AppError::internal("completed job has no results"))?;
            Ok(Json(results))
        }
        _ => Ok(Json(json!({
            "forecast_id": job.id,
            "status": job.status,
            "error_class": job.error_class,
            "error_message": job.error_message,
        }))),
    }
}

pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let job = fetch(&state, id).await?;
    Ok(Json(json!({
        "forecast_id": job.id,
        "status": job.status,
        "selected_strategy": job.selected_strategy,
        "selection_mode": job.selection_mode,
        "error_class": job.error_class,
        "error_message": job.error_message,
        "created_at": job.created_at,
        "started_at": job.started_at,
        "finished_at": job.finished_at,
    })))
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<JobQueryParams>,
) -> Result<Json<PaginatedResponse<ForecastJob>>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * page_size;

    let (jobs, total) = state.store.list(page_size, offset).await?;
    Ok(Json(PaginatedResponse {
        data: jobs,
        pagination: Pagination::new(page, page_size, total),
    }))
}

/// Download the winning forecast as CSV.
pub async fn export_csv(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let job = fetch(&state, id).await?;
    if job.status != JobStatus::Completed {
        return Err(AppError::conflict(format!(
            "forecast {id} is {} and has nothing to export",
            job.status
        )));
    }
    let results = job
        .results
        .ok_or_else(|| AppError::internal("completed job has no results"))?;

    let mut csv = String::from("timestamp,forecast,lower_bound,upper_bound\n");
    for point in results["forecast"].as_array().into_iter().flatten() {
        csv.push_str(&format!(
            "{},{},{},{}\n",
            point["timestamp"].as_str().unwrap_or(""),
            point["forecast"],
            json_cell(&point["lower_bound"]),
            json_cell(&point["upper_bound"]),
        ));
    }

    Ok(axum::response::Response::builder()
        .header("Content-Type", "text/csv")
        .header(
            "Content-Disposition",
            format!("attachment; filename=forecast-{id}.csv"),
        )
        .body(axum::body::Body::from(csv))
        .unwrap())
}

fn json_cell(value: &serde_json::Value) -> String {
    if value.is_null() {
        String::new()
    } else {
        value.to_string()
    }
}

async fn fetch(state: &AppState, id: Uuid) -> Result<ForecastJob, AppError> {
    state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Forecast", &id.to_string()))
}
