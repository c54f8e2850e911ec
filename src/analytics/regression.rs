// =============================================================================
// Hedge ratio regression — OLS and robust (IRLS) variants
// =============================================================================
//
// Ported from `original_source/analytics.py::SpreadAnalyzer.compute_hedge_ratio`,
// which fits `Y = α + β·X + ε` via `statsmodels.OLS` (or `RLM` for the robust
// branch) and keeps only β. We solve the same normal equations directly with
// `nalgebra` rather than pull in a full statistics crate — two predictors
// (intercept, X), closed form, no iteration needed for plain OLS.
// =============================================================================

use nalgebra::{Matrix2, Vector2};

use crate::types::RegressionKind;

/// Fit `Y = α + β·X` by ordinary least squares, returning β only (the
/// intercept is discarded, matching the upstream contract). Returns `0.0` if
/// the series are shorter than 2 or of unequal length (§4.E).
pub fn ols_hedge_ratio(base_y: &[f64], hedge_x: &[f64]) -> f64 {
    if base_y.len() != hedge_x.len() || base_y.len() < 2 {
        return 0.0;
    }
    match solve_normal_equations(base_y, hedge_x, None) {
        Some((_, beta)) => beta,
        None => 0.0,
    }
}

/// Fit `Y = α + β·X` by iteratively reweighted least squares with Huber
/// weights, approximating `statsmodels.RLM`'s robust regression. Falls back
/// to the OLS result if iteration does not improve on it (e.g. degenerate
/// input).
pub fn robust_hedge_ratio(base_y: &[f64], hedge_x: &[f64]) -> f64 {
    if base_y.len() != hedge_x.len() || base_y.len() < 2 {
        return 0.0;
    }
    const HUBER_C: f64 = 1.345;
    const MAX_ITERS: usize = 20;

    let mut weights = vec![1.0; base_y.len()];
    let mut beta = ols_hedge_ratio(base_y, hedge_x);
    let mut alpha = 0.0;

    for _ in 0..MAX_ITERS {
        let (a, b) = match solve_normal_equations(base_y, hedge_x, Some(&weights)) {
            Some(v) => v,
            None => break,
        };
        alpha = a;
        beta = b;

        let residuals: Vec<f64> = base_y
            .iter()
            .zip(hedge_x.iter())
            .map(|(y, x)| y - (alpha + beta * x))
            .collect();
        let scale = median_abs_deviation(&residuals).max(1e-9);
        weights = residuals
            .iter()
            .map(|r| {
                let u = (r / scale).abs();
                if u <= HUBER_C {
                    1.0
                } else {
                    HUBER_C / u
                }
            })
            .collect();
    }
    beta
}

/// Dispatch on `RegressionKind`.
pub fn hedge_ratio(kind: RegressionKind, base_y: &[f64], hedge_x: &[f64]) -> f64 {
    match kind {
        RegressionKind::Ols => ols_hedge_ratio(base_y, hedge_x),
        RegressionKind::Robust => robust_hedge_ratio(base_y, hedge_x),
    }
}

/// Elementwise spread `S = Y − β·X`, plus the fitted β.
pub fn spread_series(kind: RegressionKind, base_y: &[f64], hedge_x: &[f64]) -> (Vec<f64>, f64) {
    let beta = hedge_ratio(kind, base_y, hedge_x);
    let spread = base_y
        .iter()
        .zip(hedge_x.iter())
        .map(|(y, x)| y - beta * x)
        .collect();
    (spread, beta)
}

/// Weighted normal equations for `y = α + β·x`, solved via a 2x2 matrix
/// inverse. Returns `None` if the system is singular (e.g. `x` constant).
fn solve_normal_equations(y: &[f64], x: &[f64], weights: Option<&[f64]>) -> Option<(f64, f64)> {
    let n = y.len();
    let w = |i: usize| weights.map(|w| w[i]).unwrap_or(1.0);

    let mut sw = 0.0;
    let mut swx = 0.0;
    let mut swy = 0.0;
    let mut swxx = 0.0;
    let mut swxy = 0.0;
    for i in 0..n {
        let wi = w(i);
        sw += wi;
        swx += wi * x[i];
        swy += wi * y[i];
        swxx += wi * x[i] * x[i];
        swxy += wi * x[i] * y[i];
    }

    let a = Matrix2::new(sw, swx, swx, swxx);
    let b = Vector2::new(swy, swxy);
    let solution = a.try_inverse()? * b;
    Some((solution[0], solution[1]))
}

/// Median absolute deviation, scaled by the standard consistency constant
/// (1/Φ⁻¹(0.75) ≈ 1.4826) so it estimates σ under normality.
fn median_abs_deviation(values: &[f64]) -> f64 {
    let med = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    median(&deviations) * 1.4826
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ols_exact_linear_relationship() {
        let x: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 3.0).collect();
        assert_relative_eq!(ols_hedge_ratio(&y, &x), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn ols_too_short_returns_zero() {
        assert_eq!(ols_hedge_ratio(&[1.0], &[1.0]), 0.0);
    }

    #[test]
    fn ols_mismatched_lengths_returns_zero() {
        assert_eq!(ols_hedge_ratio(&[1.0, 2.0, 3.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn spread_series_matches_hedge_ratio() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let y = vec![2.0, 4.0, 6.0, 8.0];
        let (spread, beta) = spread_series(RegressionKind::Ols, &y, &x);
        assert_relative_eq!(beta, 2.0, epsilon = 1e-9);
        for s in spread {
            assert_relative_eq!(s, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn robust_resists_a_single_outlier() {
        let x: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        let mut y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        *y.last_mut().unwrap() += 500.0; // one wild outlier
        let beta_robust = robust_hedge_ratio(&y, &x);
        let beta_ols = ols_hedge_ratio(&y, &x);
        // robust estimate should land closer to the true slope than OLS does
        assert!((beta_robust - 2.0).abs() < (beta_ols - 2.0).abs());
    }
}
