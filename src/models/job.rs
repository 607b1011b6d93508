use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl JobStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ModelChoice {
    #[default]
    Auto,
    Arima,
    Ets,
    Xgboost,
}

impl std::fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Arima => write!(f, "arima"),
            Self::Ets => write!(f, "ets"),
            Self::Xgboost => write!(f, "xgboost"),
        }
    }
}

/// How the winning strategy was chosen: by accuracy (`auto`), by explicit
/// user request (`manual`), or by falling back after the requested strategy
/// failed to fit (`fallback`). Recorded so fallbacks are auditable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    Auto,
    Manual,
    Fallback,
}

impl std::fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manual => write!(f, "manual"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

pub const MAX_HORIZON: u32 = 365;

/// Body of `POST /api/v1/forecasts`. Immutable once accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastRequest {
    /// Upload job id returned by `POST /api/v1/uploads`.
    pub job_id: Uuid,
    pub time_column: String,
    pub target_column: String,
    #[serde(default)]
    pub exogenous_columns: Vec<String>,
    #[serde(default = "default_horizon")]
    pub horizon: u32,
    #[serde(default)]
    pub model: ModelChoice,
}

fn default_horizon() -> u32 {
    14
}

impl ForecastRequest {
    /// Caller-fault checks, performed before the job is enqueued.
    pub fn validate(&self, available_columns: &[String]) -> Result<(), String> {
        if self.horizon == 0 || self.horizon > MAX_HORIZON {
            return Err(format!("horizon must be between 1 and {MAX_HORIZON}"));
        }
        if self.time_column == self.target_column {
            return Err("time_column and target_column must differ".into());
        }
        if self.exogenous_columns.contains(&self.target_column) {
            return Err("target_column must not appear in exogenous_columns".into());
        }
        for col in [&self.time_column, &self.target_column]
            .into_iter()
            .chain(self.exogenous_columns.iter())
        {
            if !available_columns.contains(col) {
                return Err(format!("column '{col}' not found in uploaded CSV"));
            }
        }
        Ok(())
    }
}

/// Persisted forecast job record. The status column drives the worker state
/// machine: pending -> processing -> completed | failed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ForecastJob {
    pub id: Uuid,
    pub upload_id: Uuid,
    /// Denormalized from the upload so the worker never joins at claim time.
    pub file_path: String,
    pub time_column: String,
    pub target_column: String,
    /// `Vec<String>` as JSONB.
    pub exogenous_columns: serde_json::Value,
    pub horizon: i32,
    pub model_choice: ModelChoice,
    pub status: JobStatus,
    pub selected_strategy: Option<String>,
    pub selection_mode: Option<SelectionMode>,
    /// Assembled `ForecastResult`, present once completed.
    pub results: Option<serde_json::Value>,
    pub error_class: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ForecastJob {
    pub fn from_request(req: &ForecastRequest, file_path: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            upload_id: req.job_id,
            file_path,
            time_column: req.time_column.clone(),
            target_column: req.target_column.clone(),
            exogenous_columns: serde_json::to_value(&req.exogenous_columns)
                .unwrap_or_else(|_| serde_json::json!([])),
            horizon: req.horizon as i32,
            model_choice: req.model,
            status: JobStatus::Pending,
            selected_strategy: None,
            selection_mode: None,
            results: None,
            error_class: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn exogenous(&self) -> Vec<String> {
        serde_json::from_value(self.exogenous_columns.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct JobQueryParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}
