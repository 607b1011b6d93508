/// Upload intake: accept a CSV body, extract its columns and a preview,
/// score time-column candidates, and stage the file for the workers.
use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::db::UploadRepo;
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::ml::classify;
use crate::models::Upload;

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub filename: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let filename = params.filename.unwrap_or_else(|| "upload.csv".into());
    if !filename.to_lowercase().ends_with(".csv") {
        return Err(AppError::bad_request("only .csv files are accepted"));
    }
    if body.is_empty() {
        return Err(AppError::bad_request("uploaded file is empty"));
    }

    let (columns, preview) = read_preview(&body, state.pipeline.preview_rows)?;
    let time_candidates = classify::classify(&columns, &preview);

    let id = Uuid::new_v4();
    let dir = std::path::Path::new(&state.storage.data_dir).join(id.to_string());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| AppError::internal(format!("creating upload directory: {e}")))?;
    let file_path = dir.join(&filename);
    tokio::fs::write(&file_path, &body)
        .await
        .map_err(|e| AppError::internal(format!("storing upload: {e}")))?;

    let upload = Upload {
        id,
        filename: filename.clone(),
        file_path: file_path.to_string_lossy().into_owned(),
        columns: json!(columns),
        time_candidates: json!(time_candidates),
        preview: json!(preview),
        created_at: chrono::Utc::now(),
    };
    let upload = UploadRepo::create(&state.pool, &upload).await?;

    info!(upload_id = %upload.id, filename = %filename, "CSV uploaded");

    Ok(Json(json!({
        "job_id": upload.id,
        "columns": upload.columns,
        "time_candidates": upload.time_candidates,
        "preview": upload.preview,
    })))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Upload>, AppError> {
    let upload = UploadRepo::get(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Upload", &id.to_string()))?;
    Ok(Json(upload))
}

fn read_preview(
    raw: &[u8],
    preview_rows: usize,
) -> Result<(Vec<String>, Vec<HashMap<String, String>>), AppError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(raw);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::bad_request(format!("unreadable CSV header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() {
        return Err(AppError::bad_request("CSV has no columns"));
    }

    let mut preview = Vec::with_capacity(preview_rows);
    for record in reader.records().take(preview_rows) {
        let record = record.map_err(|e| AppError::bad_request(format!("unreadable CSV row: {e}")))?;
        let row: HashMap<String, String> = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        preview.push(row);
    }

    Ok((headers, preview))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_maps_rows_to_headers() {
        let raw = b"date,sales\n2024-01-01,10\n2024-01-02,11\n2024-01-03,12\n";
        let (columns, preview) = read_preview(raw, 2).unwrap();
        assert_eq!(columns, vec!["date", "sales"]);
        assert_eq!(preview.len(), 2);
        assert_eq!(preview[0]["date"], "2024-01-01");
        assert_eq!(preview[1]["sales"], "11");
    }

    #[test]
    fn rejects_headerless_garbage() {
        assert!(read_preview(b"", 5).is_err());
    }
}
