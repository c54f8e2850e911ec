// =============================================================================
// Central Application State — Aurora Stat-Arb Engine
// =============================================================================
//
// Owns every subsystem as an explicit field (§9 Design Note: no global
// singletons — an Orchestrator constructed once at startup). Handed to
// `api/rest.rs` and `api/ws.rs` as `Arc<AppState>`, exactly as the teacher's
// `AppState` is shared with its router.
// =============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;

use crate::alerts::AlertManager;
use crate::analytics::AnalyticsEngine;
use crate::broadcast::BroadcastFabric;
use crate::ingestion::IngestionBuffer;
use crate::resampler::Resampler;
use crate::runtime_config::RuntimeConfig;
use crate::tick_source::TickSource;
use crate::types::AnalyticsSnapshot;

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    pub config: RwLock<RuntimeConfig>,
    pub ingestion: Arc<IngestionBuffer>,
    pub resampler: Arc<Resampler>,
    pub tick_source: Arc<TickSource>,
    pub alerts: Arc<AlertManager>,
    pub broadcast: Arc<BroadcastFabric>,
    pub analytics_engine: RwLock<AnalyticsEngine>,

    /// Most recently computed analytics result, used by the export endpoint's
    /// "most recent analytics result" columns (§6) — export rows intentionally
    /// repeat these values across rows, a documented quirk, not a bug.
    pub last_snapshot: RwLock<Option<AnalyticsSnapshot>>,

    /// Whether the upstream feed is currently connected (health endpoint, §7:
    /// "health endpoint reflects upstream connectivity").
    pub upstream_connected: AtomicBool,
    pub start_time: Instant,
    /// Incremented every completed orchestrator tick; lets tests and the
    /// health endpoint observe liveness without polling internals.
    pub tick_counter: AtomicU64,
}

impl AppState {
    pub fn new(config: RuntimeConfig) -> Self {
        let ingestion = Arc::new(IngestionBuffer::new(config.tick_buffer_size));
        let resampler = Arc::new(Resampler::new(config.finalized_bar_cap));
        let tick_source = Arc::new(TickSource::new(config.selected_symbols.clone()));
        let alerts = Arc::new(AlertManager::new(
            config.alert_cap,
            config.alert_cooldown_secs,
            config.min_correlation,
            config.max_volatility,
        ));
        let broadcast = Arc::new(BroadcastFabric::new(config.subscriber_channel_capacity));
        let analytics_engine = RwLock::new(AnalyticsEngine::new(
            config.window_size,
            config.correlation_window,
            config.regression_type,
        ));

        Self {
            config: RwLock::new(config),
            ingestion,
            resampler,
            tick_source,
            alerts,
            broadcast,
            analytics_engine,
            last_snapshot: RwLock::new(None),
            upstream_connected: AtomicBool::new(false),
            start_time: Instant::now(),
            tick_counter: AtomicU64::new(0),
        }
    }

    pub fn set_upstream_connected(&self, connected: bool) {
        self.upstream_connected.store(connected, Ordering::Relaxed);
    }

    pub fn is_upstream_connected(&self) -> bool {
        self.upstream_connected.load(Ordering::Relaxed)
    }

    pub fn record_tick(&self) -> u64 {
        self.tick_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Replace the Configuration Snapshot and rebuild the analytics engine to
    /// match (§9 Open Question (a): readers snapshot at iteration start, so
    /// an in-flight iteration finishes against the old config).
    pub fn replace_config(&self, new_config: RuntimeConfig) {
        let mut analytics = self.analytics_engine.write();
        *analytics = AnalyticsEngine::new(new_config.window_size, new_config.correlation_window, new_config.regression_type);
        *self.config.write() = new_config;
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            upstream_connected: self.is_upstream_connected(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            ticks_processed: self.tick_counter.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub upstream_connected: bool,
    pub uptime_secs: u64,
    pub ticks_processed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_disconnected() {
        let state = AppState::new(RuntimeConfig::default());
        assert!(!state.is_upstream_connected());
        assert_eq!(state.health_snapshot().ticks_processed, 0);
    }

    #[test]
    fn replace_config_rebuilds_analytics_engine_window() {
        let state = AppState::new(RuntimeConfig::default());
        let mut new_config = RuntimeConfig::default();
        new_config.window_size = 40;
        state.replace_config(new_config);
        assert_eq!(state.analytics_engine.read().window, 40);
    }
}
