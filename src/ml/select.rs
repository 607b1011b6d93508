/// Winner selection over the strategy results. Auto selection picks the
/// lowest holdout RMSE, breaking ties by MAE and then by the fixed priority
/// order arima > ets > xgboost, so reruns over the same data always pick the
/// same winner. A manual choice wins outright when it fit; when it failed,
/// selection falls back to the auto winner and records the fallback.
use std::collections::BTreeMap;

use thiserror::Error;

use crate::ml::strategies::Strategy;
use crate::models::{ModelChoice, ModelResult, SelectionMode};

#[derive(Debug, Error)]
#[error("no viable model: every strategy failed to fit")]
pub struct NoViableModel;

pub fn select(
    results: &BTreeMap<String, ModelResult>,
    choice: ModelChoice,
) -> Result<(String, SelectionMode), NoViableModel> {
    if let Some(requested) = Strategy::from_choice(choice) {
        if results
            .get(requested.name())
            .is_some_and(|r| r.succeeded())
        {
            return Ok((requested.name().to_string(), SelectionMode::Manual));
        }
        let best = best_by_metrics(results).ok_or(NoViableModel)?;
        return Ok((best, SelectionMode::Fallback));
    }

    let best = best_by_metrics(results).ok_or(NoViableModel)?;
    Ok((best, SelectionMode::Auto))
}

/// Iterate in priority order with a strict-less comparison, so the earlier
/// strategy keeps ties.
fn best_by_metrics(results: &BTreeMap<String, ModelResult>) -> Option<String> {
    let mut best: Option<(&str, f64, f64)> = None;
    for strategy in Strategy::ALL {
        let Some(result) = results.get(strategy.name()) else {
            continue;
        };
        let Some(metrics) = result.metrics.as_ref().filter(|_| result.succeeded()) else {
            continue;
        };
        let candidate = (strategy.name(), metrics.rmse, metrics.mae);
        let better = match &best {
            None => true,
            Some((_, rmse, mae)) => {
                candidate.1 < *rmse || (candidate.1 == *rmse && candidate.2 < *mae)
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    best.map(|(name, _, _)| name.to_string())
}
