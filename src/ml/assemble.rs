/// Assembly of the final result document: historical series, the winning
/// forecast stamped onto future timestamps, the per-strategy metrics table
/// and a short prose summary. Pure merge, no recomputation.
use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;

use crate::ml::preprocess::SeriesDataset;
use crate::models::{
    ForecastJob, ForecastPoint, ForecastResult, HistoricalPoint, ModelResult, SelectionMode,
};

pub fn assemble(
    job: &ForecastJob,
    dataset: &SeriesDataset,
    all_models: BTreeMap<String, ModelResult>,
    selected: &str,
    mode: SelectionMode,
) -> ForecastResult {
    let winner = &all_models[selected];

    let historical: Vec<HistoricalPoint> = dataset
        .timestamps
        .iter()
        .zip(dataset.target.iter())
        .map(|(ts, v)| HistoricalPoint {
            timestamp: *ts,
            actual: *v,
        })
        .collect();

    // Future timestamps continue the inferred grid from the last observation.
    let last = dataset.last_timestamp();
    let forecast: Vec<ForecastPoint> = winner
        .forecast_values
        .iter()
        .enumerate()
        .map(|(k, v)| ForecastPoint {
            timestamp: last + dataset.freq * (k as i32 + 1),
            forecast: *v,
            lower_bound: winner.lower_bound.as_ref().map(|b| b[k]),
            upper_bound: winner.upper_bound.as_ref().map(|b| b[k]),
        })
        .collect();

    let metrics: BTreeMap<String, _> = all_models
        .iter()
        .filter_map(|(name, r)| r.metrics.clone().map(|m| (name.clone(), m)))
        .collect();

    let insights = build_insights(dataset, winner, selected, mode, &all_models);

    ForecastResult {
        forecast_id: Uuid::new_v4(),
        job_id: job.id,
        selected_strategy: selected.to_string(),
        selection_mode: mode,
        horizon: winner.forecast_values.len(),
        historical,
        forecast,
        metrics,
        all_models,
        insights,
        completed_at: Utc::now(),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Plain-prose summary of the forecast: trend direction, winning model and
/// how it was chosen, and how many strategies were usable.
fn build_insights(
    dataset: &SeriesDataset,
    winner: &ModelResult,
    selected: &str,
    mode: SelectionMode,
    all_models: &BTreeMap<String, ModelResult>,
) -> String {
    let mut parts = Vec::new();

    let recent_n = (dataset.len() / 4).max(1);
    let recent = mean(&dataset.target[dataset.len() - recent_n..]);
    let forecast_mean = mean(&winner.forecast_values);
    let direction = if recent.abs() > f64::EPSILON {
        let change = (forecast_mean - recent) / recent.abs() * 100.0;
        if change > 2.0 {
            format!("The forecast trends upward, about {change:.1}% above the recent average.")
        } else if change < -2.0 {
            format!(
                "The forecast trends downward, about {:.1}% below the recent average.",
                change.abs()
            )
        } else {
            "The forecast is roughly flat relative to the recent average.".to_string()
        }
    } else {
        "The forecast is roughly flat relative to the recent average.".to_string()
    };
    parts.push(direction);

    match mode {
        SelectionMode::Auto => {
            if let Some(m) = &winner.metrics {
                parts.push(format!(
                    "{selected} gave the best holdout accuracy ({:.1}%) and was selected automatically.",
                    m.accuracy
                ));
            }
        }
        SelectionMode::Manual => {
            parts.push(format!("{selected} was used as explicitly requested."));
        }
        SelectionMode::Fallback => {
            parts.push(format!(
                "The requested model failed to fit, so {selected} was used as a fallback."
            ));
        }
    }

    let usable = all_models.values().filter(|r| r.succeeded()).count();
    if usable < all_models.len() {
        parts.push(format!(
            "{usable} of {} candidate models produced a usable fit on this series.",
            all_models.len()
        ));
    }

    if winner.lower_bound.is_some() {
        parts.push("The shaded interval covers 95% of expected outcomes.".to_string());
    }

    parts.join(" ")
}
