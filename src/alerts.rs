// =============================================================================
// Alert Manager — threshold rules, cooldown, bounded ring
// =============================================================================
//
// Ported 1:1 from `original_source/alerts.py::AlertManager`. Structured like
// `risk.rs`: a single `RwLock<Inner>` guarding all mutable state, with a
// public API that returns owned snapshots rather than references into the
// lock. Subscriber callbacks are registered the way `trade_stream.rs`
// registers trade callbacks — a `Vec<Box<dyn Fn(&Alert) + Send + Sync>>`,
// each invoked in turn, one failing callback never blocking the rest.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use crate::types::{AlertKind, AnalyticsSnapshot, Direction};

pub const DEFAULT_MAX_ALERTS: usize = 100;
pub const DEFAULT_COOLDOWN_SECS: i64 = 60;
pub const DEFAULT_MIN_CORRELATION: f64 = 0.5;
pub const DEFAULT_MAX_VOLATILITY: f64 = 500.0;

use crate::types::Alert;

struct Inner {
    ring: VecDeque<Alert>,
    last_fire: HashMap<String, i64>,
}

pub struct AlertManager {
    inner: RwLock<Inner>,
    max_alerts: usize,
    cooldown_secs: i64,
    min_correlation: f64,
    max_volatility: f64,
    callbacks: RwLock<Vec<Box<dyn Fn(&Alert) + Send + Sync>>>,
}

impl AlertManager {
    pub fn new(max_alerts: usize, cooldown_secs: i64, min_correlation: f64, max_volatility: f64) -> Self {
        Self {
            inner: RwLock::new(Inner {
                ring: VecDeque::new(),
                last_fire: HashMap::new(),
            }),
            max_alerts,
            cooldown_secs,
            min_correlation,
            max_volatility,
            callbacks: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, callback: Box<dyn Fn(&Alert) + Send + Sync>) {
        self.callbacks.write().push(callback);
    }

    /// Evaluate every rule in §4.F against `snapshot` once per tick. `symbol`
    /// tags the resulting alerts (and their cooldown keys); pass `None` for a
    /// pair-level snapshot that isn't about any one symbol (the usual case —
    /// `AnalyticsSnapshot` describes the pair, not a single symbol, so it is
    /// evaluated once, not once per configured symbol).
    pub fn evaluate(&self, snapshot: &AnalyticsSnapshot, symbol: Option<&str>, z_threshold: f64, now_ms: i64) {
        self.evaluate_zscore(snapshot.z_score, symbol, z_threshold, now_ms);
        self.evaluate_correlation(snapshot.correlation, symbol, now_ms);
        self.evaluate_volatility(snapshot.rolling_volatility, symbol, now_ms);
    }

    fn evaluate_zscore(&self, z: f64, symbol: Option<&str>, threshold: f64, now_ms: i64) {
        let label = Self::label(symbol);
        let abs_z = z.abs();
        if abs_z > threshold {
            let direction = if z >= 0.0 { Direction::Above } else { Direction::Below };
            self.fire(
                AlertKind::Alert,
                "Z-Score Breach",
                &format!("{label} z-score {z:.2} exceeds threshold {threshold:.2}"),
                symbol,
                Some(z),
                Some("z_score"),
                Some(threshold),
                Some(direction),
                now_ms,
            );
        } else if abs_z > threshold * 0.8 {
            let direction = if z >= 0.0 { Direction::Above } else { Direction::Below };
            self.fire(
                AlertKind::Warning,
                "Z-Score Approaching Threshold",
                &format!("{label} z-score {z:.2} approaching threshold {threshold:.2}"),
                symbol,
                Some(z),
                Some("z_score"),
                Some(threshold * 0.8),
                Some(direction),
                now_ms,
            );
        }
    }

    fn evaluate_correlation(&self, correlation: f64, symbol: Option<&str>, now_ms: i64) {
        if correlation.abs() < self.min_correlation {
            let label = Self::label(symbol);
            self.fire(
                AlertKind::Warning,
                "Low Correlation",
                &format!("{label} correlation {correlation:.2} below {:.2}", self.min_correlation),
                symbol,
                Some(correlation),
                Some("correlation"),
                Some(self.min_correlation),
                Some(Direction::Below),
                now_ms,
            );
        }
    }

    fn evaluate_volatility(&self, volatility: f64, symbol: Option<&str>, now_ms: i64) {
        if volatility > self.max_volatility {
            let label = Self::label(symbol);
            self.fire(
                AlertKind::Warning,
                "High Volatility",
                &format!("{label} volatility {volatility:.2} above {:.2}", self.max_volatility),
                symbol,
                Some(volatility),
                Some("volatility"),
                Some(self.max_volatility),
                Some(Direction::Above),
                now_ms,
            );
        }
    }

    fn label(symbol: Option<&str>) -> &str {
        symbol.unwrap_or("pair")
    }

    #[allow(clippy::too_many_arguments)]
    fn fire(
        &self,
        kind: AlertKind,
        title: &str,
        message: &str,
        symbol: Option<&str>,
        value: Option<f64>,
        metric: Option<&str>,
        threshold: Option<f64>,
        direction: Option<Direction>,
        now_ms: i64,
    ) {
        let key = format!("{kind}:{title}:{}", symbol.unwrap_or(""));
        {
            let inner = self.inner.read();
            if let Some(&last) = inner.last_fire.get(&key) {
                if now_ms - last < self.cooldown_secs * 1000 {
                    return;
                }
            }
        }

        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            kind,
            title: title.to_string(),
            message: message.to_string(),
            display_time: crate::types::format_hms(now_ms),
            symbol: symbol.map(str::to_string),
            value,
            metric: metric.map(str::to_string),
            threshold,
            direction,
        };

        {
            let mut inner = self.inner.write();
            inner.last_fire.insert(key, now_ms);
            inner.ring.push_back(alert.clone());
            while inner.ring.len() > self.max_alerts {
                inner.ring.pop_front();
            }
        }

        info!(kind = %alert.kind, title = %alert.title, symbol = ?alert.symbol, "alert fired");
        for callback in self.callbacks.read().iter() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(&alert))) {
                error!(?panic, "alert callback panicked");
            }
        }
    }

    /// Newest-first copy of the ring, truncated to `limit` (default = all).
    pub fn list(&self, limit: Option<usize>) -> Vec<Alert> {
        let inner = self.inner.read();
        let mut alerts: Vec<Alert> = inner.ring.iter().rev().cloned().collect();
        if let Some(n) = limit {
            alerts.truncate(n);
        }
        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn snapshot_with(z_score: f64, correlation: f64, rolling_volatility: f64) -> AnalyticsSnapshot {
        AnalyticsSnapshot {
            instant_ms: 0,
            spread: 0.0,
            z_score,
            correlation,
            rolling_mean: 0.0,
            rolling_volatility,
            symbols: vec![],
            stationarity: crate::analytics::adf::adf_test(&[0.0; 12], 0.05),
        }
    }

    #[test]
    fn zscore_breach_fires_alert_kind() {
        let mgr = AlertManager::new(DEFAULT_MAX_ALERTS, DEFAULT_COOLDOWN_SECS, DEFAULT_MIN_CORRELATION, DEFAULT_MAX_VOLATILITY);
        let snapshot = snapshot_with(4.25, 0.9, 10.0);
        mgr.evaluate(&snapshot, Some("BTCUSDT"), 2.0, 0);
        let alerts = mgr.list(None);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Alert);
        assert_eq!(alerts[0].direction, Some(Direction::Above));
    }

    #[test]
    fn cooldown_suppresses_repeat_within_window() {
        let mgr = AlertManager::new(DEFAULT_MAX_ALERTS, 60, DEFAULT_MIN_CORRELATION, DEFAULT_MAX_VOLATILITY);
        let snapshot = snapshot_with(4.25, 0.9, 10.0);
        mgr.evaluate(&snapshot, Some("BTCUSDT"), 2.0, 0);
        mgr.evaluate(&snapshot, Some("BTCUSDT"), 2.0, 30_000);
        assert_eq!(mgr.list(None).len(), 1);

        mgr.evaluate(&snapshot, Some("BTCUSDT"), 2.0, 61_000);
        assert_eq!(mgr.list(None).len(), 2);
    }

    #[test]
    fn ring_evicts_oldest_beyond_capacity() {
        let mgr = AlertManager::new(2, 0, DEFAULT_MIN_CORRELATION, DEFAULT_MAX_VOLATILITY);
        for i in 0..5 {
            let snapshot = snapshot_with(4.25, 0.9, 10.0);
            mgr.evaluate(&snapshot, Some("BTCUSDT"), 2.0, i * 1000);
        }
        assert_eq!(mgr.list(None).len(), 2);
    }

    #[test]
    fn low_correlation_warns() {
        let mgr = AlertManager::new(DEFAULT_MAX_ALERTS, DEFAULT_COOLDOWN_SECS, 0.5, DEFAULT_MAX_VOLATILITY);
        let snapshot = snapshot_with(0.1, 0.2, 10.0);
        mgr.evaluate(&snapshot, Some("ETHUSDT"), 2.0, 0);
        let alerts = mgr.list(None);
        assert!(alerts.iter().any(|a| a.metric.as_deref() == Some("correlation")));
    }

    #[test]
    fn callback_panic_does_not_block_other_callbacks() {
        let mgr = AlertManager::new(DEFAULT_MAX_ALERTS, 0, DEFAULT_MIN_CORRELATION, DEFAULT_MAX_VOLATILITY);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_panic = calls.clone();
        mgr.register(Box::new(move |_alert| {
            calls_panic.fetch_add(1, Ordering::SeqCst);
            panic!("boom");
        }));
        let calls_ok = calls.clone();
        mgr.register(Box::new(move |_alert| {
            calls_ok.fetch_add(1, Ordering::SeqCst);
        }));

        let snapshot = snapshot_with(4.25, 0.9, 10.0);
        mgr.evaluate(&snapshot, Some("BTCUSDT"), 2.0, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
