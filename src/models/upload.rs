use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One time-axis candidate produced by the column classifier, with a
/// confidence score in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeCandidate {
    pub column: String,
    pub score: f64,
}

/// Metadata recorded for an uploaded CSV. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Upload {
    pub id: Uuid,
    pub filename: String,
    pub file_path: String,
    /// Ordered column names, as JSONB.
    pub columns: serde_json::Value,
    /// `Vec<TimeCandidate>`, descending by score, as JSONB.
    pub time_candidates: serde_json::Value,
    /// First rows of the file as row-mappings, as JSONB.
    pub preview: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Upload {
    pub fn column_names(&self) -> Vec<String> {
        serde_json::from_value(self.columns.clone()).unwrap_or_default()
    }
}
