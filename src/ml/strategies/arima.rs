/// ARIMA(p,1,0): an autoregression on the once-differenced series, with the
/// AR order chosen by AIC over p in 0..=3 via conditional least squares.
/// 95% intervals come from the psi-weight variance of the integrated
/// process. Deterministic; no external solver.
use super::{variance, FitError, StrategyForecast};

const MIN_LEN: usize = 8;
const MAX_ORDER: usize = 3;
const VARIANCE_FLOOR: f64 = 1e-10;
const Z_95: f64 = 1.959_963_985;

struct ArFit {
    intercept: f64,
    coefs: Vec<f64>,
    sigma2: f64,
    aic: f64,
}

pub fn fit_and_forecast(train: &[f64], steps: usize) -> Result<StrategyForecast, FitError> {
    if train.len() < MIN_LEN {
        return Err(FitError::InsufficientData(format!(
            "arima needs at least {MIN_LEN} observations, got {}",
            train.len()
        )));
    }
    if variance(train) < VARIANCE_FLOOR {
        return Err(FitError::Degenerate(
            "constant-valued series has no ARIMA representation".into(),
        ));
    }

    let diff: Vec<f64> = train.windows(2).map(|w| w[1] - w[0]).collect();

    let mut best: Option<ArFit> = None;
    for order in 0..=MAX_ORDER.min(diff.len().saturating_sub(2)) {
        if let Some(fit) = fit_ar(&diff, order) {
            if best.as_ref().map_or(true, |b| fit.aic < b.aic) {
                best = Some(fit);
            }
        }
    }
    let fit = best.ok_or_else(|| FitError::Model("AR order search found no usable fit".into()))?;

    // Forecast the differences recursively, then integrate.
    let mut history: Vec<f64> = diff.clone();
    let mut point = Vec::with_capacity(steps);
    let mut level = *train.last().expect("train is non-empty");
    for _ in 0..steps {
        let mut next = fit.intercept;
        for (k, phi) in fit.coefs.iter().enumerate() {
            next += phi * history[history.len() - 1 - k];
        }
        history.push(next);
        level += next;
        point.push(level);
    }

    // Psi weights of the differenced AR process, then cumulative weights for
    // the integrated series; forecast variance grows with their squares.
    let mut psi = vec![0.0; steps];
    psi[0] = 1.0;
    for j in 1..steps {
        let mut val = 0.0;
        for (k, phi) in fit.coefs.iter().enumerate() {
            if j > k {
                val += phi * psi[j - 1 - k];
            }
        }
        psi[j] = val;
    }
    let mut cumulative = 0.0;
    let mut var_sum = 0.0;
    let mut lower = Vec::with_capacity(steps);
    let mut upper = Vec::with_capacity(steps);
    for (h, p) in point.iter().enumerate() {
        cumulative += psi[h];
        var_sum += cumulative * cumulative;
        let width = Z_95 * (fit.sigma2 * var_sum).sqrt();
        lower.push(p - width);
        upper.push(p + width);
    }

    Ok(StrategyForecast {
        point,
        lower: Some(lower),
        upper: Some(upper),
    })
}

/// Conditional least squares AR(p) with intercept. Returns `None` when the
/// normal equations are singular or there are too few samples.
fn fit_ar(diff: &[f64], order: usize) -> Option<ArFit> {
    let n = diff.len().checked_sub(order)?;
    if n < order + 2 {
        return None;
    }

    let dim = order + 1;
    let mut xtx = vec![vec![0.0; dim]; dim];
    let mut xty = vec![0.0; dim];

    for t in order..diff.len() {
        let mut row = Vec::with_capacity(dim);
        row.push(1.0);
        for k in 1..=order {
            row.push(diff[t - k]);
        }
        for i in 0..dim {
            xty[i] += row[i] * diff[t];
            for j in 0..dim {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    let beta = solve(xtx, xty)?;
    let intercept = beta[0];
    let coefs = beta[1..].to_vec();

    let mut rss = 0.0;
    for t in order..diff.len() {
        let mut pred = intercept;
        for k in 1..=order {
            pred += coefs[k - 1] * diff[t - k];
        }
        let resid = diff[t] - pred;
        rss += resid * resid;
    }
    let sigma2 = (rss / n as f64).max(1e-12);
    let aic = n as f64 * sigma2.ln() + 2.0 * (order + 1) as f64;

    Some(ArFit {
        intercept,
        coefs,
        sigma2,
        aic,
    })
}

/// Gaussian elimination with partial pivoting for the tiny normal-equation
/// systems (at most 4x4).
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in row + 1..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_trend_is_extrapolated() {
        let train: Vec<f64> = (0..40).map(|i| 10.0 + 2.0 * i as f64).collect();
        let out = fit_and_forecast(&train, 5).unwrap();

        assert_eq!(out.point.len(), 5);
        // a perfectly linear series continues at slope 2
        for (h, v) in out.point.iter().enumerate() {
            let expected = 10.0 + 2.0 * (40 + h) as f64;
            assert!((v - expected).abs() < 1.0, "step {h}: {v} vs {expected}");
        }
    }

    #[test]
    fn intervals_widen_with_horizon() {
        let train: Vec<f64> = (0..50)
            .map(|i| 100.0 + i as f64 + if i % 2 == 0 { 3.0 } else { -3.0 })
            .collect();
        let out = fit_and_forecast(&train, 10).unwrap();
        let lower = out.lower.unwrap();
        let upper = out.upper.unwrap();

        let first_width = upper[0] - lower[0];
        let last_width = upper[9] - lower[9];
        assert!(first_width > 0.0);
        assert!(last_width > first_width);
        for i in 0..10 {
            assert!(lower[i] <= out.point[i] && out.point[i] <= upper[i]);
        }
    }

    #[test]
    fn rejects_short_series() {
        let err = fit_and_forecast(&[1.0, 2.0, 3.0], 5).unwrap_err();
        assert!(matches!(err, FitError::InsufficientData(_)));
    }

    #[test]
    fn rejects_constant_series() {
        let train = vec![7.0; 30];
        let err = fit_and_forecast(&train, 5).unwrap_err();
        assert!(matches!(err, FitError::Degenerate(_)));
    }

    #[test]
    fn deterministic() {
        let train: Vec<f64> = (0..30).map(|i| (i as f64 * 0.7).sin() * 10.0 + 50.0).collect();
        let a = fit_and_forecast(&train, 7).unwrap();
        let b = fit_and_forecast(&train, 7).unwrap();
        assert_eq!(a.point, b.point);
    }

    #[test]
    fn solver_handles_simple_system() {
        // x + y = 3, x - y = 1 => x = 2, y = 1
        let x = solve(vec![vec![1.0, 1.0], vec![1.0, -1.0]], vec![3.0, 1.0]).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-9);
        assert!((x[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn singular_system_returns_none() {
        assert!(solve(vec![vec![1.0, 1.0], vec![2.0, 2.0]], vec![1.0, 2.0]).is_none());
    }
}
