/// Gradient-boosted regression stumps on lag features, the tree-based
/// member of the strategy set. Multi-step prediction is recursive: each
/// predicted value becomes a lag for the next step. Exogenous series enter
/// as extra regressors; beyond the observed series their last value is
/// carried forward. Fully deterministic and interval-free (no bounds are
/// fabricated).
use crate::ml::preprocess::SeriesDataset;

use super::{FitError, StrategyForecast};

const MAX_LAGS: usize = 7;
const N_ESTIMATORS: usize = 60;
const LEARNING_RATE: f64 = 0.1;
const MAX_THRESHOLDS: usize = 16;

/// One depth-1 regression tree.
struct Stump {
    feature: usize,
    threshold: f64,
    left: f64,
    right: f64,
}

impl Stump {
    fn predict(&self, features: &[f64]) -> f64 {
        if features[self.feature] <= self.threshold {
            self.left
        } else {
            self.right
        }
    }
}

struct Ensemble {
    base: f64,
    stumps: Vec<Stump>,
}

impl Ensemble {
    fn predict(&self, features: &[f64]) -> f64 {
        let mut out = self.base;
        for stump in &self.stumps {
            out += LEARNING_RATE * stump.predict(features);
        }
        out
    }
}

pub fn fit_and_forecast(dataset: &SeriesDataset, steps: usize) -> Result<StrategyForecast, FitError> {
    let train = dataset.train_target();
    let n_lags = MAX_LAGS.min(train.len() / 3).max(2);
    if train.len() < n_lags + 2 {
        return Err(FitError::InsufficientData(format!(
            "boosted model needs at least {} observations, got {}",
            n_lags + 2,
            train.len()
        )));
    }

    let exog: Vec<&Vec<f64>> = dataset.exogenous.values().collect();

    // Supervised samples: lag window plus exogenous values at the target
    // index.
    let mut features: Vec<Vec<f64>> = Vec::new();
    let mut targets: Vec<f64> = Vec::new();
    for i in n_lags..train.len() {
        let mut row: Vec<f64> = train[i - n_lags..i].to_vec();
        for series in &exog {
            row.push(series[i]);
        }
        features.push(row);
        targets.push(train[i]);
    }

    let ensemble = fit_ensemble(&features, &targets);

    // Recursive prediction from the end of the train window.
    let mut window: Vec<f64> = train[train.len() - n_lags..].to_vec();
    let mut point = Vec::with_capacity(steps);
    for step in 0..steps {
        let idx = dataset.train_end + step;
        let mut row = window.clone();
        for series in &exog {
            let v = if idx < series.len() {
                series[idx]
            } else {
                *series.last().expect("exogenous series is non-empty")
            };
            row.push(v);
        }
        let pred = ensemble.predict(&row);
        point.push(pred);
        window.remove(0);
        window.push(pred);
    }

    Ok(StrategyForecast {
        point,
        lower: None,
        upper: None,
    })
}

fn fit_ensemble(features: &[Vec<f64>], targets: &[f64]) -> Ensemble {
    let base = targets.iter().sum::<f64>() / targets.len() as f64;
    let mut residuals: Vec<f64> = targets.iter().map(|t| t - base).collect();
    let mut stumps = Vec::with_capacity(N_ESTIMATORS);

    for _ in 0..N_ESTIMATORS {
        let Some(stump) = best_stump(features, &residuals) else {
            break;
        };
        for (row, resid) in features.iter().zip(residuals.iter_mut()) {
            *resid -= LEARNING_RATE * stump.predict(row);
        }
        stumps.push(stump);
    }

    Ensemble { base, stumps }
}

/// Exhaustive search over features and up to `MAX_THRESHOLDS` quantile
/// thresholds for the split minimising squared error of the residuals.
fn best_stump(features: &[Vec<f64>], residuals: &[f64]) -> Option<Stump> {
    let n = residuals.len();
    let dim = features.first()?.len();
    let total: f64 = residuals.iter().sum();
    let total_sq: f64 = residuals.iter().map(|r| r * r).sum();
    let base_sse = total_sq - total * total / n as f64;

    let mut best: Option<(f64, Stump)> = None;

    for feature in 0..dim {
        let mut values: Vec<f64> = features.iter().map(|row| row[feature]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();
        if values.len() < 2 {
            continue;
        }

        let step = (values.len() - 1).div_ceil(MAX_THRESHOLDS).max(1);
        for w in (0..values.len() - 1).step_by(step) {
            let threshold = (values[w] + values[w + 1]) / 2.0;

            let mut left_sum = 0.0;
            let mut left_n = 0usize;
            for (row, resid) in features.iter().zip(residuals.iter()) {
                if row[feature] <= threshold {
                    left_sum += resid;
                    left_n += 1;
                }
            }
            if left_n == 0 || left_n == n {
                continue;
            }
            let right_sum = total - left_sum;
            let right_n = n - left_n;
            let left_mean = left_sum / left_n as f64;
            let right_mean = right_sum / right_n as f64;

            // SSE reduction of a mean-split; larger is better.
            let gain = left_mean * left_sum + right_mean * right_sum;
            let sse = base_sse - (gain - total * total / n as f64);

            if best.as_ref().map_or(true, |(b, _)| sse < *b) {
                best = Some((
                    sse,
                    Stump {
                        feature,
                        threshold,
                        left: left_mean,
                        right: right_mean,
                    },
                ));
            }
        }
    }

    best.map(|(_, stump)| stump)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::strategies::tests::dataset_from;

    #[test]
    fn forecasts_requested_steps() {
        let values: Vec<f64> = (0..50).map(|i| 50.0 + (i % 5) as f64 * 2.0).collect();
        let ds = dataset_from(values, 7);
        let out = fit_and_forecast(&ds, 10).unwrap();
        assert_eq!(out.point.len(), 10);
        assert!(out.lower.is_none());
        assert!(out.upper.is_none());
    }

    #[test]
    fn constant_series_predicts_the_constant() {
        let ds = dataset_from(vec![42.0; 40], 7);
        let out = fit_and_forecast(&ds, 5).unwrap();
        for v in &out.point {
            assert!((v - 42.0).abs() < 1e-6, "{v}");
        }
    }

    #[test]
    fn rejects_tiny_series() {
        let ds = dataset_from(vec![1.0, 2.0, 3.0], 1);
        assert!(matches!(
            fit_and_forecast(&ds, 3),
            Err(FitError::InsufficientData(_))
        ));
    }

    #[test]
    fn deterministic() {
        let values: Vec<f64> = (0..40).map(|i| (i as f64).sqrt() * 10.0).collect();
        let ds = dataset_from(values, 5);
        let a = fit_and_forecast(&ds, 5).unwrap();
        let b = fit_and_forecast(&ds, 5).unwrap();
        assert_eq!(a.point, b.point);
    }

    #[test]
    fn uses_exogenous_when_present() {
        // target tracks the exogenous series; the model should pick it up
        let n = 60;
        let exog_vals: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 0.0 } else { 10.0 }).collect();
        let values: Vec<f64> = exog_vals.iter().map(|e| 5.0 + e).collect();
        let mut ds = dataset_from(values, 6);
        ds.exogenous.insert("promo".into(), exog_vals);

        let out = fit_and_forecast(&ds, 4).unwrap();
        assert_eq!(out.point.len(), 4);
        // predictions stay within the observed range rather than diverging
        for v in &out.point {
            assert!(*v > 0.0 && *v < 20.0);
        }
    }
}
