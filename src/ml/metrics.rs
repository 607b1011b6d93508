/// Holdout error metrics, computed identically for every strategy so the
/// comparison is fair.
use crate::models::StrategyMetrics;

/// Compute MAE, RMSE, MAPE and accuracy for predictions against the true
/// holdout values. Points where the true value is exactly zero are excluded
/// from the MAPE denominator.
pub fn compute(actual: &[f64], predicted: &[f64]) -> StrategyMetrics {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return StrategyMetrics {
            mae: 0.0,
            rmse: 0.0,
            mape: 0.0,
            accuracy: 0.0,
        };
    }

    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut pct_sum = 0.0;
    let mut pct_n = 0usize;

    for (a, p) in actual.iter().zip(predicted.iter()).take(n) {
        let err = p - a;
        abs_sum += err.abs();
        sq_sum += err * err;
        if *a != 0.0 {
            pct_sum += (err.abs() / a.abs()) * 100.0;
            pct_n += 1;
        }
    }

    let mae = abs_sum / n as f64;
    let rmse = (sq_sum / n as f64).sqrt();
    let mape = if pct_n > 0 { pct_sum / pct_n as f64 } else { 0.0 };
    let accuracy = (100.0 - mape).clamp(0.0, 100.0);

    StrategyMetrics {
        mae,
        rmse,
        mape,
        accuracy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_values() {
        let m = compute(&[10.0, 20.0, 30.0], &[12.0, 18.0, 33.0]);
        assert!((m.mae - 7.0 / 3.0).abs() < 1e-9);
        assert!((m.rmse - (17.0f64 / 3.0).sqrt()).abs() < 1e-9);
        assert!((m.mape - 40.0 / 3.0).abs() < 1e-9);
        assert!((m.accuracy - (100.0 - 40.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn zero_actuals_excluded_from_mape() {
        let m = compute(&[0.0, 10.0], &[5.0, 11.0]);
        // only the second point enters the MAPE denominator
        assert!((m.mape - 10.0).abs() < 1e-9);
        // but both enter MAE/RMSE
        assert!((m.mae - 3.0).abs() < 1e-9);
    }

    #[test]
    fn accuracy_clamped_to_zero() {
        let m = compute(&[1.0], &[10.0]);
        assert!(m.mape > 100.0);
        assert_eq!(m.accuracy, 0.0);
    }

    #[test]
    fn perfect_prediction() {
        let m = compute(&[5.0, 6.0], &[5.0, 6.0]);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.accuracy, 100.0);
    }
}
