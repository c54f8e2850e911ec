// =============================================================================
// Runtime Configuration — Configuration Snapshot with atomic save
// =============================================================================
//
// Holds the Configuration Snapshot (§3) plus the server-side tunables of §6.
// Persistence uses the same atomic tmp + rename pattern as the teacher's
// config hub. Every field carries `#[serde(default = "...")]` so an older
// config file on disk never breaks loading — unknown/missing fields fall
// back to their defaults rather than erroring.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::RegressionKind;

fn default_true() -> bool {
    true
}

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

fn default_timeframe() -> String {
    "1m".to_string()
}

fn default_window_size() -> usize {
    20
}

fn default_z_score_threshold() -> f64 {
    2.0
}

fn default_tick_buffer_size() -> usize {
    10_000
}

fn default_finalized_bar_cap() -> usize {
    1_000
}

fn default_alert_cap() -> usize {
    100
}

fn default_alert_cooldown_secs() -> i64 {
    60
}

fn default_broadcast_cadence_secs() -> u64 {
    1
}

fn default_correlation_window() -> usize {
    60
}

fn default_min_correlation() -> f64 {
    0.5
}

fn default_max_volatility() -> f64 {
    500.0
}

fn default_export_max_rows() -> usize {
    100_000
}

fn default_subscriber_channel_capacity() -> usize {
    32
}

/// The Configuration Snapshot of §3: client-replaceable, mutated atomically
/// as a whole by `POST /api/settings`. Field names are camelCase on the wire
/// per §6 (`selectedSymbols`, `windowSize`, `regressionType`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Symbols tracked, in order. First is the base (dependent, Y) series,
    /// second is the hedge (independent, X) series — §9 Open Question (b):
    /// changing this mid-stream does not re-subscribe the upstream feed.
    #[serde(default = "default_symbols")]
    pub selected_symbols: Vec<String>,

    #[serde(default = "default_timeframe")]
    pub timeframe: String,

    /// Rolling window for z-score / rolling mean / rolling volatility.
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default)]
    pub regression_type: RegressionKind,

    #[serde(default = "default_z_score_threshold")]
    pub z_score_threshold: f64,

    #[serde(default = "default_true")]
    pub is_live: bool,

    // --- Server-side tunables (§6) ------------------------------------------
    #[serde(default = "default_tick_buffer_size")]
    pub tick_buffer_size: usize,

    #[serde(default = "default_finalized_bar_cap")]
    pub finalized_bar_cap: usize,

    #[serde(default = "default_alert_cap")]
    pub alert_cap: usize,

    #[serde(default = "default_alert_cooldown_secs")]
    pub alert_cooldown_secs: i64,

    #[serde(default = "default_broadcast_cadence_secs")]
    pub broadcast_cadence_secs: u64,

    #[serde(default = "default_correlation_window")]
    pub correlation_window: usize,

    #[serde(default = "default_min_correlation")]
    pub min_correlation: f64,

    #[serde(default = "default_max_volatility")]
    pub max_volatility: f64,

    /// Row cap for `/export/*` responses (supplemented feature, see
    /// SPEC_FULL.md).
    #[serde(default = "default_export_max_rows")]
    pub export_max_rows: usize,

    #[serde(default = "default_subscriber_channel_capacity")]
    pub subscriber_channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            selected_symbols: default_symbols(),
            timeframe: default_timeframe(),
            window_size: default_window_size(),
            regression_type: RegressionKind::default(),
            z_score_threshold: default_z_score_threshold(),
            is_live: true,
            tick_buffer_size: default_tick_buffer_size(),
            finalized_bar_cap: default_finalized_bar_cap(),
            alert_cap: default_alert_cap(),
            alert_cooldown_secs: default_alert_cooldown_secs(),
            broadcast_cadence_secs: default_broadcast_cadence_secs(),
            correlation_window: default_correlation_window(),
            min_correlation: default_min_correlation(),
            max_volatility: default_max_volatility(),
            export_max_rows: default_export_max_rows(),
            subscriber_channel_capacity: default_subscriber_channel_capacity(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`, then apply env-var
    /// overrides (`AURORA_SYMBOLS`, `AURORA_BIND_ADDR` is handled by the
    /// caller separately since it isn't part of the snapshot).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        if let Ok(symbols) = std::env::var("AURORA_SYMBOLS") {
            config.selected_symbols = symbols.split(',').map(|s| s.trim().to_uppercase()).collect();
        }

        info!(
            path = %path.display(),
            symbols = ?config.selected_symbols,
            regression = ?config.regression_type,
            "runtime config loaded"
        );
        Ok(config)
    }

    /// Load from `path`, falling back to defaults with a warning on any
    /// failure, as `main.rs` does for the teacher's config.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "failed to load runtime config, using defaults");
                Self::default()
            }
        }
    }

    /// Persist via atomic write (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).context("failed to serialize runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.selected_symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(cfg.window_size, 20);
        assert_eq!(cfg.regression_type, RegressionKind::Ols);
        assert_eq!(cfg.z_score_threshold, 2.0);
        assert_eq!(cfg.tick_buffer_size, 10_000);
        assert_eq!(cfg.finalized_bar_cap, 1_000);
        assert_eq!(cfg.alert_cap, 100);
        assert_eq!(cfg.alert_cooldown_secs, 60);
        assert_eq!(cfg.correlation_window, 60);
    }

    #[test]
    fn deserialize_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.selected_symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(cfg.max_volatility, 500.0);
    }

    #[test]
    fn deserialize_partial_json_fills_defaults() {
        let json = r#"{ "selectedSymbols": ["ETHUSDT", "SOLUSDT"], "zScoreThreshold": 3.0 }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.selected_symbols, vec!["ETHUSDT", "SOLUSDT"]);
        assert_eq!(cfg.z_score_threshold, 3.0);
        assert_eq!(cfg.window_size, 20);
    }

    #[test]
    fn roundtrip_serialization() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.selected_symbols, cfg2.selected_symbols);
        assert_eq!(cfg.window_size, cfg2.window_size);
    }
}
