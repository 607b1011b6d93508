/// Forecasting strategies behind one contract. Each strategy fits once on
/// the pre-holdout window and predicts `holdout + horizon` steps; the first
/// `holdout` predictions are scored against the true holdout and the rest
/// are the published forecast. No refitting, so all strategies are compared
/// on identical terms.
pub mod arima;
pub mod boosted;
pub mod ets;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::ml::metrics;
use crate::ml::preprocess::SeriesDataset;
use crate::models::{ModelChoice, ModelResult};

/// Closed set of strategies. `ALL` doubles as the deterministic priority
/// order used for tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strategy {
    Arima,
    Ets,
    Xgboost,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Arima, Strategy::Ets, Strategy::Xgboost];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Arima => "arima",
            Self::Ets => "ets",
            Self::Xgboost => "xgboost",
        }
    }

    pub fn from_choice(choice: ModelChoice) -> Option<Strategy> {
        match choice {
            ModelChoice::Auto => None,
            ModelChoice::Arima => Some(Self::Arima),
            ModelChoice::Ets => Some(Self::Ets),
            ModelChoice::Xgboost => Some(Self::Xgboost),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw output of one fit: `steps` point predictions and, when the method
/// natively supports intervals, matching bounds.
#[derive(Debug, Clone)]
pub struct StrategyForecast {
    pub point: Vec<f64>,
    pub lower: Option<Vec<f64>>,
    pub upper: Option<Vec<f64>>,
}

#[derive(Debug, Error)]
pub enum FitError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("degenerate series: {0}")]
    Degenerate(String),
    #[error("model error: {0}")]
    Model(String),
}

/// Run one strategy end to end. Fitting failures are captured on the
/// returned `ModelResult` rather than propagated, so a per-strategy failure
/// is never fatal to the job.
pub fn run(strategy: Strategy, dataset: &SeriesDataset, horizon: usize) -> ModelResult {
    let holdout_len = dataset.holdout_len();
    let steps = holdout_len + horizon;

    let outcome = match strategy {
        Strategy::Arima => arima::fit_and_forecast(dataset.train_target(), steps),
        Strategy::Ets => ets::fit_and_forecast(dataset.train_target(), steps),
        Strategy::Xgboost => boosted::fit_and_forecast(dataset, steps),
    };

    match outcome {
        Ok(forecast) => {
            debug_assert_eq!(forecast.point.len(), steps);
            let holdout_predictions = forecast.point[..holdout_len].to_vec();
            let forecast_values = forecast.point[holdout_len..].to_vec();
            let lower_bound = forecast.lower.map(|v| v[holdout_len..].to_vec());
            let upper_bound = forecast.upper.map(|v| v[holdout_len..].to_vec());
            let metrics = metrics::compute(dataset.holdout_target(), &holdout_predictions);

            ModelResult {
                strategy: strategy.name().to_string(),
                forecast_values,
                lower_bound,
                upper_bound,
                holdout_predictions,
                metrics: Some(metrics),
                fit_error: None,
            }
        }
        Err(err) => {
            tracing::warn!(strategy = %strategy, error = %err, "Strategy failed to fit");
            ModelResult::failed(strategy.name(), err.to_string())
        }
    }
}

/// Fan out every strategy over the dataset. Strategies are independent and
/// share no mutable state; results are collected keyed by strategy name.
pub fn run_all(dataset: &SeriesDataset, horizon: usize) -> BTreeMap<String, ModelResult> {
    Strategy::ALL
        .iter()
        .map(|s| (s.name().to_string(), run(*s, dataset, horizon)))
        .collect()
}

pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use std::collections::BTreeMap as Map;

    pub(crate) fn dataset_from(values: Vec<f64>, horizon: usize) -> SeriesDataset {
        let n = values.len();
        let holdout = horizon.min(n / 5).max(1).min(n - 1);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        SeriesDataset {
            timestamps: (0..n).map(|i| start + Duration::days(i as i64)).collect(),
            target: values,
            exogenous: Map::new(),
            freq: Duration::days(1),
            train_end: n - holdout,
        }
    }

    fn trending(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64 * 1.5 + ((i % 4) as f64)).collect()
    }

    #[test]
    fn forecast_lengths_match_horizon() {
        let ds = dataset_from(trending(60), 14);
        for strategy in Strategy::ALL {
            let result = run(strategy, &ds, 14);
            assert!(result.succeeded(), "{strategy} failed: {:?}", result.fit_error);
            assert_eq!(result.forecast_values.len(), 14, "{strategy}");
            assert_eq!(result.holdout_predictions.len(), ds.holdout_len(), "{strategy}");
            assert!(result.metrics.is_some(), "{strategy}");
        }
    }

    #[test]
    fn bounds_bracket_forecasts_when_present() {
        let ds = dataset_from(trending(60), 10);
        for strategy in Strategy::ALL {
            let result = run(strategy, &ds, 10);
            if let (Some(lower), Some(upper)) = (&result.lower_bound, &result.upper_bound) {
                assert_eq!(lower.len(), result.forecast_values.len());
                assert_eq!(upper.len(), result.forecast_values.len());
                for i in 0..lower.len() {
                    assert!(
                        lower[i] <= result.forecast_values[i] + 1e-9
                            && result.forecast_values[i] <= upper[i] + 1e-9,
                        "{strategy} bound violated at {i}"
                    );
                }
            }
        }
    }

    #[test]
    fn constant_series_fails_arima_and_ets_but_not_boosted() {
        let ds = dataset_from(vec![42.0; 40], 7);
        let results = run_all(&ds, 7);

        assert!(!results["arima"].succeeded());
        assert!(!results["ets"].succeeded());
        let boosted = &results["xgboost"];
        assert!(boosted.succeeded(), "boosted: {:?}", boosted.fit_error);
        for v in &boosted.forecast_values {
            assert!((v - 42.0).abs() < 1.0);
        }
    }

    #[test]
    fn failure_is_captured_not_raised() {
        // far too short for arima
        let ds = dataset_from(vec![1.0, 2.0, 3.0, 4.0, 5.0], 3);
        let result = run(Strategy::Arima, &ds, 3);
        assert!(!result.succeeded());
        assert!(result.forecast_values.is_empty());
        assert!(result.metrics.is_none());
    }

    #[test]
    fn run_all_covers_every_strategy() {
        let ds = dataset_from(trending(40), 5);
        let results = run_all(&ds, 5);
        assert_eq!(results.len(), 3);
        for s in Strategy::ALL {
            assert!(results.contains_key(s.name()));
        }
    }
}
