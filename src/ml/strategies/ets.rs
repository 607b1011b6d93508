/// Exponential smoothing via augurs AutoETS (non-seasonal). Intervals are
/// passed through only when the fitted model provides them; they are never
/// synthesised.
use augurs::ets::AutoETS;
use augurs::prelude::*;

use super::{variance, FitError, StrategyForecast};

const MIN_LEN: usize = 7;
const VARIANCE_FLOOR: f64 = 1e-10;
const CONFIDENCE_LEVEL: f64 = 0.95;

pub fn fit_and_forecast(train: &[f64], steps: usize) -> Result<StrategyForecast, FitError> {
    if train.len() < MIN_LEN {
        return Err(FitError::InsufficientData(format!(
            "ets needs at least {MIN_LEN} observations, got {}",
            train.len()
        )));
    }
    if variance(train) < VARIANCE_FLOOR {
        return Err(FitError::Degenerate(
            "constant-valued series gives a degenerate smoothing fit".into(),
        ));
    }

    let ets = AutoETS::non_seasonal();
    let model = ets
        .fit(train)
        .map_err(|e| FitError::Model(format!("ETS fit: {e}")))?;
    let forecast = model
        .predict(steps, CONFIDENCE_LEVEL)
        .map_err(|e| FitError::Model(format!("ETS predict: {e}")))?;

    let (lower, upper) = match forecast.intervals {
        Some(intervals) => (Some(intervals.lower), Some(intervals.upper)),
        None => (None, None),
    };

    Ok(StrategyForecast {
        point: forecast.point,
        lower,
        upper,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forecasts_requested_steps() {
        let train: Vec<f64> = (0..30).map(|i| 100.0 + i as f64 * 0.5).collect();
        let out = fit_and_forecast(&train, 7).unwrap();
        assert_eq!(out.point.len(), 7);
        if let (Some(lower), Some(upper)) = (&out.lower, &out.upper) {
            assert_eq!(lower.len(), 7);
            assert_eq!(upper.len(), 7);
            for i in 0..7 {
                assert!(lower[i] <= out.point[i] && out.point[i] <= upper[i]);
            }
        }
    }

    #[test]
    fn rejects_short_series() {
        let err = fit_and_forecast(&[1.0, 2.0, 3.0], 5).unwrap_err();
        assert!(matches!(err, FitError::InsufficientData(_)));
    }

    #[test]
    fn rejects_constant_series() {
        let err = fit_and_forecast(&[9.0; 20], 5).unwrap_err();
        assert!(matches!(err, FitError::Degenerate(_)));
    }
}
