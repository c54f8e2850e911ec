// =============================================================================
// Analytics Engine — orchestrates regression, rolling stats and ADF
// =============================================================================
//
// Stateless orchestrator mirroring `original_source/analytics.py::AnalyticsEngine`:
// every method takes its inputs by value/reference and returns a result or an
// absent sentinel, never holding data of its own (ownership of price history
// stays with `resampler.rs`/`ingestion.rs`, per §5's ownership rule).
// =============================================================================

pub mod adf;
pub mod regression;
pub mod stats;

use crate::types::{AdfResult, AnalyticsSnapshot, RegressionKind, SymbolMetric};

/// One point of a spread/z-score analysis, per §4.E's "analyze" entry point.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SpreadDataPoint {
    pub instant_ms: i64,
    pub time: String,
    pub spread: f64,
    pub z_score: f64,
    pub upper_threshold: f64,
    pub lower_threshold: f64,
}

/// `analyze(base_prices, hedge_prices, threshold, kind)`: absent if either
/// series is shorter than `window`.
pub fn analyze(
    base_prices: &[f64],
    hedge_prices: &[f64],
    window: usize,
    threshold: f64,
    kind: RegressionKind,
    instant_ms: i64,
) -> Option<SpreadDataPoint> {
    if base_prices.len() < window || hedge_prices.len() < window {
        return None;
    }
    let (spread, _beta) = regression::spread_series(kind, base_prices, hedge_prices);
    let z_score = stats::rolling_zscore(&spread, window)?;
    Some(SpreadDataPoint {
        instant_ms,
        time: crate::types::format_hms(instant_ms),
        spread: *spread.last()?,
        z_score,
        upper_threshold: threshold,
        lower_threshold: -threshold,
    })
}

/// Orchestrates a full `AnalyticsSnapshot` for the configured symbol set,
/// mirroring `AnalyticsEngine.compute_summary_stats`.
pub struct AnalyticsEngine {
    pub window: usize,
    pub correlation_window: usize,
    pub regression_kind: RegressionKind,
}

impl AnalyticsEngine {
    pub fn new(window: usize, correlation_window: usize, regression_kind: RegressionKind) -> Self {
        Self {
            window,
            correlation_window,
            regression_kind,
        }
    }

    /// `base_closes`/`hedge_closes` are positionally aligned (per
    /// `resampler::price_history`'s tail-index contract), oldest-first.
    /// `latest_prices`/`previous_prices` feed the per-symbol change summary
    /// in the order of `symbol_order`.
    #[allow(clippy::too_many_arguments)]
    pub fn snapshot(
        &self,
        instant_ms: i64,
        base_closes: &[f64],
        hedge_closes: &[f64],
        symbol_order: &[String],
        latest_prices: &[f64],
        previous_prices: &[f64],
    ) -> AnalyticsSnapshot {
        let (spread, _beta) = regression::spread_series(self.regression_kind, base_closes, hedge_closes);
        let z_score = stats::rolling_zscore(&spread, self.window).unwrap_or(0.0);
        let correlation =
            stats::pearson_correlation(base_closes, hedge_closes, self.correlation_window).unwrap_or(0.0);
        let rolling_mean = stats::rolling_mean(&spread, self.window).unwrap_or(0.0);
        let rolling_volatility = stats::rolling_std(&spread, self.window).unwrap_or(0.0);
        let stationarity = adf::adf_test(&spread, 0.05);

        let symbols = symbol_order
            .iter()
            .zip(latest_prices.iter())
            .zip(previous_prices.iter())
            .map(|((symbol, &latest), &previous)| {
                let (abs_change, pct_change) = stats::price_change(latest, previous);
                SymbolMetric {
                    symbol: symbol.clone(),
                    price: latest,
                    abs_change,
                    pct_change,
                }
            })
            .collect();

        AnalyticsSnapshot {
            instant_ms,
            spread: spread.last().copied().unwrap_or(0.0),
            z_score,
            correlation,
            rolling_mean,
            rolling_volatility,
            symbols,
            stationarity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_absent_below_window() {
        let base = vec![1.0, 2.0, 3.0];
        let hedge = vec![1.0, 2.0, 3.0];
        assert!(analyze(&base, &hedge, 20, 2.0, RegressionKind::Ols, 0).is_none());
    }

    #[test]
    fn analyze_produces_symmetric_thresholds() {
        let base: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let hedge: Vec<f64> = (0..30).map(|i| i as f64 * 2.0).collect();
        let point = analyze(&base, &hedge, 20, 2.5, RegressionKind::Ols, 123).unwrap();
        assert_eq!(point.upper_threshold, 2.5);
        assert_eq!(point.lower_threshold, -2.5);
    }

    #[test]
    fn snapshot_correlation_absent_defaults_to_zero() {
        let engine = AnalyticsEngine::new(20, 60, RegressionKind::Ols);
        let base: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let hedge: Vec<f64> = (0..30).map(|i| i as f64 * 1.5).collect();
        let symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];
        let snapshot = engine.snapshot(0, &base, &hedge, &symbols, &[100.0, 200.0], &[99.0, 199.0]);
        assert_eq!(snapshot.correlation, 0.0); // fewer than 60 points
        assert_eq!(snapshot.symbols.len(), 2);
    }
}
