use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::SelectionMode;

/// Holdout-window error metrics for one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
    /// `max(0, 100 - mape)` clamped to [0, 100].
    pub accuracy: f64,
}

/// Output of one model runner. Either a full forecast with metrics, or a
/// captured `fit_error` with empty forecast fields. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResult {
    pub strategy: String,
    /// Length equals the requested horizon for successful fits.
    pub forecast_values: Vec<f64>,
    /// Present only when the method natively provides intervals;
    /// elementwise `lower <= forecast <= upper`.
    pub lower_bound: Option<Vec<f64>>,
    pub upper_bound: Option<Vec<f64>>,
    /// Predictions aligned to the holdout window, used for scoring.
    pub holdout_predictions: Vec<f64>,
    pub metrics: Option<StrategyMetrics>,
    pub fit_error: Option<String>,
}

impl ModelResult {
    pub fn failed(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            forecast_values: Vec::new(),
            lower_bound: None,
            upper_bound: None,
            holdout_predictions: Vec::new(),
            metrics: None,
            fit_error: Some(reason.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.fit_error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub timestamp: NaiveDateTime,
    pub actual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: NaiveDateTime,
    pub forecast: f64,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
}

/// Assembled result document for a completed job. Pure merge of the series,
/// every strategy's output and the selection outcome; persisted as JSONB and
/// served verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult {
    pub forecast_id: Uuid,
    pub job_id: Uuid,
    pub selected_strategy: String,
    pub selection_mode: SelectionMode,
    pub horizon: usize,
    pub historical: Vec<HistoricalPoint>,
    pub forecast: Vec<ForecastPoint>,
    /// Metrics for every strategy that fit, keyed by strategy name.
    pub metrics: BTreeMap<String, StrategyMetrics>,
    /// Every runner's output, including failures, for the comparison view.
    pub all_models: BTreeMap<String, ModelResult>,
    pub insights: String,
    pub completed_at: DateTime<Utc>,
}
