// =============================================================================
// Pure rolling statistics — mean, std, Pearson correlation, z-score
// =============================================================================
//
// Free functions over slices, `Option`-returning on insufficient data, styled
// after `indicators/ema.rs`: no state, no side effects, one concern each.
// =============================================================================

/// Sample mean of `values`. `None` if empty.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Bessel-corrected (divisor n−1) sample standard deviation. `None` if fewer
/// than 2 values.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Rolling mean of the last `window` values. Absent if fewer than `window`.
pub fn rolling_mean(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    mean(&values[values.len() - window..])
}

/// Rolling sample standard deviation of the last `window` values. Absent if
/// fewer than `window`.
pub fn rolling_std(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    std_dev(&values[values.len() - window..])
}

/// Rolling z-score of the last value in `series` against the trailing
/// `window`-sized sample. `σ = 0` yields `0.0` rather than `None` (a flat
/// window is not "insufficient data", it's a real degenerate case).
pub fn rolling_zscore(series: &[f64], window: usize) -> Option<f64> {
    if window == 0 || series.len() < window {
        return None;
    }
    let tail = &series[series.len() - window..];
    let m = mean(tail)?;
    let sigma = std_dev(tail)?;
    let last = *series.last()?;
    if sigma == 0.0 {
        Some(0.0)
    } else {
        Some((last - m) / sigma)
    }
}

/// Pearson correlation of the trailing `window` elements of `a` and `b`.
/// Absent if either series has fewer than `window` elements.
pub fn pearson_correlation(a: &[f64], b: &[f64], window: usize) -> Option<f64> {
    if window < 2 || a.len() < window || b.len() < window {
        return None;
    }
    let a_tail = &a[a.len() - window..];
    let b_tail = &b[b.len() - window..];
    let mean_a = mean(a_tail)?;
    let mean_b = mean(b_tail)?;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..window {
        let da = a_tail[i] - mean_a;
        let db = b_tail[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        return Some(0.0);
    }
    let rho = cov / denom;
    if rho.is_finite() {
        Some(rho)
    } else {
        None
    }
}

/// Absolute and percentage change between `latest` and `previous`. Percentage
/// change is `0.0` when `previous == 0.0` (division by zero → 0, per §4.E).
pub fn price_change(latest: f64, previous: f64) -> (f64, f64) {
    let abs_change = latest - previous;
    let pct_change = if previous != 0.0 { abs_change / previous * 100.0 } else { 0.0 };
    (abs_change, pct_change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_of_empty_is_none() {
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn mean_known_value() {
        assert_relative_eq!(mean(&[1.0, 2.0, 3.0]).unwrap(), 2.0);
    }

    #[test]
    fn std_dev_bessel_corrected() {
        // population {2,4,4,4,5,5,7,9}, sample std (ddof=1) = 2.13809...
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(std_dev(&data).unwrap(), 2.138089935, epsilon = 1e-6);
    }

    #[test]
    fn std_dev_single_value_is_none() {
        assert_eq!(std_dev(&[5.0]), None);
    }

    #[test]
    fn rolling_zscore_insufficient_data() {
        assert_eq!(rolling_zscore(&[1.0, 2.0], 5), None);
    }

    #[test]
    fn rolling_zscore_flat_window_is_zero() {
        let series = vec![5.0; 20];
        assert_eq!(rolling_zscore(&series, 20), Some(0.0));
    }

    #[test]
    fn rolling_zscore_known_value() {
        let mut series = vec![10.0; 19];
        series.push(20.0);
        let z = rolling_zscore(&series, 20).unwrap();
        assert!(z > 0.0);
    }

    #[test]
    fn pearson_perfect_positive_correlation() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let b = vec![2.0, 4.0, 6.0, 8.0, 10.0];
        assert_relative_eq!(pearson_correlation(&a, &b, 5).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn pearson_insufficient_data() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0];
        assert_eq!(pearson_correlation(&a, &b, 5), None);
    }

    #[test]
    fn price_change_zero_previous() {
        let (abs, pct) = price_change(10.0, 0.0);
        assert_eq!(abs, 10.0);
        assert_eq!(pct, 0.0);
    }

    #[test]
    fn price_change_known_value() {
        let (abs, pct) = price_change(110.0, 100.0);
        assert_relative_eq!(abs, 10.0);
        assert_relative_eq!(pct, 10.0);
    }
}
