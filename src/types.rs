// =============================================================================
// Shared types used across the Aurora stat-arb engine
// =============================================================================

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single normalized trade from the upstream feed. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    /// Trade time (not event time), milliseconds since epoch.
    pub trade_time_ms: i64,
}

/// Resampling interval a bar belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    OneSecond,
    OneMinute,
}

impl Interval {
    /// Bucket width in milliseconds.
    pub fn millis(self) -> i64 {
        match self {
            Interval::OneSecond => 1_000,
            Interval::OneMinute => 60_000,
        }
    }

    /// Floor a trade-time (ms since epoch) to this interval's bucket start.
    pub fn floor(self, trade_time_ms: i64) -> i64 {
        let width = self.millis();
        trade_time_ms.div_euclid(width) * width
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::OneSecond => write!(f, "1s"),
            Interval::OneMinute => write!(f, "1m"),
        }
    }
}

/// OHLCV bar. `low <= open <= high` and `low <= close <= high` always hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    pub bucket_start_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(bucket_start_ms: i64, price: f64, quantity: f64) -> Self {
        Self {
            bucket_start_ms,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: quantity,
        }
    }

    /// Fold another tick from the same bucket into this bar.
    pub fn fold(&mut self, price: f64, quantity: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += quantity;
    }
}

/// A row of the positionally-aligned price history across a symbol set.
/// See `resampler::price_history` for the (documented, non-timestamp) join.
#[derive(Debug, Clone, Serialize)]
pub struct PriceHistoryRow {
    pub bucket_start_ms: i64,
    /// Close price per symbol, in the order the symbols were requested.
    pub closes: Vec<f64>,
}

/// Per-symbol latest/previous price comparison used in the summary snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolMetric {
    pub symbol: String,
    pub price: f64,
    pub abs_change: f64,
    pub pct_change: f64,
}

/// Full analytics result produced on demand by the analytics engine. Not stored.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSnapshot {
    pub instant_ms: i64,
    pub spread: f64,
    pub z_score: f64,
    pub correlation: f64,
    pub rolling_mean: f64,
    pub rolling_volatility: f64,
    pub symbols: Vec<SymbolMetric>,
    pub stationarity: AdfResult,
}

/// MacKinnon critical values for the Augmented Dickey-Fuller statistic.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CriticalValues {
    #[serde(rename = "1%")]
    pub one_pct: f64,
    #[serde(rename = "5%")]
    pub five_pct: f64,
    #[serde(rename = "10%")]
    pub ten_pct: f64,
}

/// Result of an Augmented Dickey-Fuller stationarity test (§4.E).
#[derive(Debug, Clone, Serialize)]
pub struct AdfResult {
    pub adf_statistic: f64,
    pub p_value: f64,
    pub critical_values: CriticalValues,
    pub stationary: bool,
    pub lags_used: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Direction of a threshold breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Above => write!(f, "above"),
            Direction::Below => write!(f, "below"),
        }
    }
}

/// Alert severity. Casing is intentionally mixed (`warning`, `ALERT`) to match
/// the upstream contract verbatim — see GLOSSARY / §9 Open Question (c).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "danger")]
    Danger,
    #[serde(rename = "ALERT")]
    Alert,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Info => write!(f, "info"),
            AlertKind::Warning => write!(f, "warning"),
            AlertKind::Danger => write!(f, "danger"),
            AlertKind::Alert => write!(f, "ALERT"),
        }
    }
}

/// A single alert emitted by the alert manager.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    /// Formatted HH:MM:SS display time.
    pub display_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

/// Regression method used to compute the hedge ratio / spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegressionKind {
    Ols,
    Robust,
}

impl Default for RegressionKind {
    fn default() -> Self {
        Self::Ols
    }
}

/// Downstream broadcast topic. Each subscriber belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Prices,
    Spread,
    Correlation,
    Summary,
    Alerts,
    Analytics,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::Prices,
        Topic::Spread,
        Topic::Correlation,
        Topic::Summary,
        Topic::Alerts,
        Topic::Analytics,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Prices => "prices",
            Topic::Spread => "spread",
            Topic::Correlation => "correlation",
            Topic::Summary => "summary",
            Topic::Alerts => "alerts",
            Topic::Analytics => "analytics",
        }
    }

    pub fn parse(s: &str) -> Option<Topic> {
        match s {
            "prices" => Some(Topic::Prices),
            "spread" => Some(Topic::Spread),
            "correlation" => Some(Topic::Correlation),
            "summary" => Some(Topic::Summary),
            "alerts" => Some(Topic::Alerts),
            "analytics" => Some(Topic::Analytics),
            _ => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Format a millisecond timestamp as HH:MM:SS (UTC), matching the upstream
/// `datetime.utcnow().strftime('%H:%M:%S')` convention.
pub fn format_hms(instant_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(instant_ms)
        .unwrap_or_else(Utc::now)
        .format("%H:%M:%S")
        .to_string()
}

/// Format a millisecond timestamp as ISO-8601 seconds (UTC, no offset
/// suffix), matching the upstream `datetime.utcnow().isoformat(timespec='seconds')`
/// convention used for the `analytics` topic's `timestamp` field.
pub fn format_iso8601_secs(instant_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(instant_ms)
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}
