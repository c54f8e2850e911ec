// =============================================================================
// Augmented Dickey-Fuller stationarity test
// =============================================================================
//
// Ported from `original_source/analytics.py::StationarityTester.adf_test`,
// which delegates to `statsmodels.tsa.stattools.adfuller(spread,
// autolag='AIC')` with the default constant-only regression (no trend). We
// reimplement the same procedure directly: regress Δy_t on a constant, y_{t-1}
// and p lagged differences, for p = 0..=max_lag, picking the p that minimizes
// AIC over a sample held fixed in size across all candidate p (so the AIC
// values are comparable, exactly as statsmodels's `autolag` path does). The
// chosen regression's t-statistic on y_{t-1} is the ADF statistic.
//
// Critical values and the p-value are approximated from the MacKinnon (1994)
// response surface: critical values via a response-surface regression in
// 1/T, the p-value via interpolation against a small table of asymptotic
// quantiles with `statrs::distribution::Normal` filling in the tails.
// =============================================================================

use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::types::{AdfResult, CriticalValues};

const MIN_OBSERVATIONS: usize = 12;

/// Run the ADF test on `spread` at the given significance level (default
/// 0.05, per §4.E). Returns `stationary = false` with an explanatory `error`
/// string if there isn't enough data or the regression is singular.
pub fn adf_test(spread: &[f64], significance: f64) -> AdfResult {
    if spread.len() < MIN_OBSERVATIONS {
        return insufficient_data_result("insufficient data for ADF test (need >= 12 points)");
    }

    match fit(spread) {
        Some((statistic, lags_used)) => {
            let critical_values = response_surface_critical_values(spread.len());
            let p = p_value(statistic);
            AdfResult {
                adf_statistic: statistic,
                p_value: p,
                stationary: p < significance,
                critical_values,
                lags_used,
                error: None,
            }
        }
        None => insufficient_data_result("ADF regression failed (singular design matrix)"),
    }
}

fn insufficient_data_result(message: &str) -> AdfResult {
    AdfResult {
        adf_statistic: 0.0,
        p_value: 1.0,
        stationary: false,
        critical_values: CriticalValues {
            one_pct: 0.0,
            five_pct: 0.0,
            ten_pct: 0.0,
        },
        lags_used: 0,
        error: Some(message.to_string()),
    }
}

/// Fit the AIC-selected ADF regression, returning (t-statistic on y_{t-1}, p).
fn fit(spread: &[f64]) -> Option<(f64, usize)> {
    let n = spread.len();
    let max_lag = ((12.0 * (n as f64 / 100.0).powf(0.25)).floor() as usize).min(n.saturating_sub(4));

    // Δy_t for t = 1..=n-1, stored at index t-1.
    let diffs: Vec<f64> = (1..n).map(|i| spread[i] - spread[i - 1]).collect();

    let t_start = max_lag + 1;
    let t_end = n - 1;
    if t_start > t_end {
        return None;
    }
    let nobs = t_end - t_start + 1;
    if nobs < 5 {
        return None;
    }

    let mut best: Option<(f64, f64, usize)> = None; // (aic, t_stat, p)
    for p in 0..=max_lag {
        let k = 2 + p;
        let mut x = DMatrix::<f64>::zeros(nobs, k);
        let mut y = DVector::<f64>::zeros(nobs);

        for (row, t) in (t_start..=t_end).enumerate() {
            y[row] = diffs[t - 1];
            x[(row, 0)] = 1.0;
            x[(row, 1)] = spread[t - 1];
            for lag in 1..=p {
                x[(row, 1 + lag)] = diffs[t - 1 - lag];
            }
        }

        let xtx = x.transpose() * &x;
        let xtx_inv = match xtx.try_inverse() {
            Some(inv) => inv,
            None => continue,
        };
        let xty = x.transpose() * &y;
        let beta = &xtx_inv * &xty;
        let resid = &y - &x * &beta;
        let rss = resid.dot(&resid);
        if !(rss > 0.0) || nobs <= k {
            continue;
        }

        let aic = (nobs as f64) * (rss / nobs as f64).ln() + 2.0 * (k as f64);
        let sigma2 = rss / (nobs - k) as f64;
        let se_gamma = (sigma2 * xtx_inv[(1, 1)]).sqrt();
        if se_gamma <= 0.0 || !se_gamma.is_finite() {
            continue;
        }
        let t_stat = beta[1] / se_gamma;

        if best.as_ref().map_or(true, |(best_aic, _, _)| aic < *best_aic) {
            best = Some((aic, t_stat, p));
        }
    }
    best.map(|(_, t_stat, p)| (t_stat, p))
}

/// MacKinnon (1994) response-surface critical values for the constant-only
/// ADF regression (no trend, one right-hand variable).
fn response_surface_critical_values(n: usize) -> CriticalValues {
    let t = n as f64;
    CriticalValues {
        one_pct: -3.4336 - 5.999 / t - 29.25 / (t * t),
        five_pct: -2.8621 - 2.738 / t - 8.36 / (t * t),
        ten_pct: -2.5671 - 1.438 / t - 4.48 / (t * t),
    }
}

/// Asymptotic quantile table for the constant-only ADF statistic
/// (MacKinnon 1994, Table 1), used to interpolate a p-value. Beyond the
/// table's range the tail probability is read off a normal distribution
/// fitted to the two nearest table points.
const QUANTILE_TABLE: &[(f64, f64)] = &[
    (-4.38, 0.0001),
    (-3.95, 0.01),
    (-3.60, 0.025),
    (-3.24, 0.05),
    (-2.86, 0.10),
    (-2.62, 0.25),
    (-1.95, 0.50),
    (-1.27, 0.75),
    (-0.64, 0.90),
    (-0.24, 0.95),
    (0.13, 0.975),
    (0.60, 0.99),
    (1.20, 0.9999),
];

fn p_value(tau: f64) -> f64 {
    let first = QUANTILE_TABLE[0];
    let last = QUANTILE_TABLE[QUANTILE_TABLE.len() - 1];

    if tau <= first.0 {
        return tail_probability(tau, first, QUANTILE_TABLE[1]);
    }
    if tau >= last.0 {
        return tail_probability(tau, QUANTILE_TABLE[QUANTILE_TABLE.len() - 2], last);
    }
    for window in QUANTILE_TABLE.windows(2) {
        let (t0, p0) = window[0];
        let (t1, p1) = window[1];
        if tau >= t0 && tau <= t1 {
            let frac = (tau - t0) / (t1 - t0);
            return p0 + frac * (p1 - p0);
        }
    }
    0.5
}

/// Fit a normal distribution whose CDF passes through both anchor points,
/// then read the tail probability at `tau` from it.
fn tail_probability(tau: f64, anchor_a: (f64, f64), anchor_b: (f64, f64)) -> f64 {
    let standard = Normal::new(0.0, 1.0).expect("standard normal is always valid");
    let za = standard.inverse_cdf(anchor_a.1);
    let zb = standard.inverse_cdf(anchor_b.1);
    if (zb - za).abs() < 1e-9 {
        return anchor_a.1.clamp(1e-6, 1.0 - 1e-6);
    }
    let sigma_signed = (anchor_b.0 - anchor_a.0) / (zb - za);
    let mu = anchor_a.0 - sigma_signed * za;
    let fitted = Normal::new(mu, sigma_signed.abs().max(1e-9)).expect("response-surface fit is always valid");
    fitted.cdf(tau).clamp(1e-6, 1.0 - 1e-6)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mean_reverting_series(n: usize) -> Vec<f64> {
        // x_t = 0.3 * x_{t-1} + noise, strongly stationary.
        let mut x = 0.0;
        let mut out = Vec::with_capacity(n);
        let mut seed = 7u64;
        for _ in 0..n {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            let noise = ((seed >> 33) as f64 / u32::MAX as f64 - 0.5) * 2.0;
            x = 0.3 * x + noise;
            out.push(x);
        }
        out
    }

    fn random_walk(n: usize) -> Vec<f64> {
        let mut x = 0.0;
        let mut out = Vec::with_capacity(n);
        let mut seed = 11u64;
        for _ in 0..n {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            let noise = ((seed >> 33) as f64 / u32::MAX as f64 - 0.5) * 2.0;
            x += noise;
            out.push(x);
        }
        out
    }

    #[test]
    fn insufficient_data_reports_error() {
        let result = adf_test(&[1.0, 2.0, 3.0], 0.05);
        assert!(!result.stationary);
        assert_eq!(result.p_value, 1.0);
        assert!(result.error.is_some());
    }

    #[test]
    fn mean_reverting_series_tends_stationary() {
        let series = mean_reverting_series(200);
        let result = adf_test(&series, 0.05);
        assert!(result.error.is_none());
        assert!(result.adf_statistic < result.critical_values.five_pct + 3.0);
    }

    #[test]
    fn random_walk_yields_a_higher_statistic_than_mean_reverting() {
        let walk = random_walk(200);
        let reverting = mean_reverting_series(200);
        let walk_result = adf_test(&walk, 0.05);
        let reverting_result = adf_test(&reverting, 0.05);
        assert!(walk_result.adf_statistic > reverting_result.adf_statistic);
    }

    #[test]
    fn p_value_is_monotonic_in_statistic() {
        let p_low = p_value(-5.0);
        let p_mid = p_value(-2.0);
        let p_high = p_value(2.0);
        assert!(p_low < p_mid);
        assert!(p_mid < p_high);
    }
}
