// =============================================================================
// Orchestrator — wires A→B→C, C→E, E→F→G and drives the periodic analytics tick
// =============================================================================
//
// Structured like `main.rs`'s per-symbol stream-spawning loop and its
// reconciliation loop: a handful of `tokio::spawn`ed background tasks sharing
// one `Arc<AppState>`, each looping under its own `tokio::time::interval` or
// reconnect-with-backoff wrapper. Nothing here owns global state directly —
// every field lives on `AppState` (§9 Design Note: no global singletons).
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::app_state::AppState;
use crate::types::{AnalyticsSnapshot, Interval, Topic};

const RECONNECT_BASE: Duration = Duration::from_secs(5);
const RECONNECT_CAP: Duration = Duration::from_secs(60);
const ANALYTICS_WINDOW_BARS: usize = 60;

/// Start every background task and return once they are all spawned. The
/// caller (`main.rs`) awaits `tokio::signal::ctrl_c()` afterward.
pub fn spawn_all(state: Arc<AppState>) {
    register_alert_broadcast(&state);

    tokio::spawn(run_tick_reconnect_loop(state.clone()));
    tokio::spawn(run_ingestion_loop(state.clone()));
    tokio::spawn(run_bar_finalizer_loop(state.clone()));
    tokio::spawn(run_analytics_loop(state));
}

/// Wire the alert manager's fan-out callback to the `alerts` broadcast topic
/// (§4.F: "fan out alerts to subscribers").
fn register_alert_broadcast(state: &Arc<AppState>) {
    let broadcast = state.broadcast.clone();
    state.alerts.register(Box::new(move |alert| {
        let envelope = Envelope {
            kind: "alert",
            data: alert.clone(),
            timestamp_ms: Utc::now().timestamp_millis(),
        };
        broadcast.publish(Topic::Alerts, &envelope);
    }));
}

/// Exponential-backoff reconnect loop around `TickSource::run_once` (§4.A
/// REDESIGN: base 5s, ×2, cap 60s, reset to 0 after a successful connection —
/// the teacher's `main.rs` retries flat every 5s; this generalizes that to
/// the spec's backoff).
async fn run_tick_reconnect_loop(state: Arc<AppState>) {
    let mut backoff = RECONNECT_BASE;
    loop {
        state.set_upstream_connected(false);
        match state.tick_source.run_once().await {
            Ok(()) => {
                info!("tick source connection ended cleanly");
                backoff = RECONNECT_BASE;
            }
            Err(e) => {
                error!(error = %e, backoff_secs = backoff.as_secs(), "tick source connection failed, backing off");
            }
        }
        state.set_upstream_connected(false);
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(RECONNECT_CAP);
    }
}

/// Drain normalized ticks from the tick source into the ingestion buffer and
/// resampler (§2 control flow: "A ingests trades asynchronously and calls B
/// then C per tick").
async fn run_ingestion_loop(state: Arc<AppState>) {
    let mut rx = state.tick_source.register(1024);
    state.set_upstream_connected(true);
    while let Some(tick) = rx.recv().await {
        state.set_upstream_connected(true);
        state.ingestion.ingest(tick.clone());
        state.resampler.ingest(&tick);
        state.record_tick();
    }
    warn!("tick channel closed, ingestion loop exiting");
}

/// Background sweep for minute bars the resampler can't finalize on its own
/// (§4.D), structured like `exit/monitor.rs`'s periodic interval loop.
async fn run_bar_finalizer_loop(state: Arc<AppState>) {
    let finalizer = crate::bar_finalizer::BarFinalizer::new(state.resampler.clone(), Duration::from_secs(1));
    finalizer.run().await;
}

/// The 1 Hz analytics tick of §4.H: snapshot config, pull aligned price
/// history, compute analytics, evaluate alerts, broadcast per topic.
async fn run_analytics_loop(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    // Previous iteration's latest prices, for the per-symbol change summary
    // (§4.E: "latest and previous prices yield ... absolute change"). Owned
    // by this loop alone, so a plain local suffices.
    let mut previous_by_symbol: HashMap<String, f64> = HashMap::new();

    loop {
        ticker.tick().await;
        let config = state.config.read().clone();

        let latest_prices: HashMap<String, f64> = state.ingestion.latest_prices(&config.selected_symbols);
        if latest_prices.is_empty() {
            continue;
        }

        let now_ms = Utc::now().timestamp_millis();
        let rows = state
            .resampler
            .price_history(&config.selected_symbols, Interval::OneSecond, ANALYTICS_WINDOW_BARS);

        let snapshot = if rows.len() >= 2 && config.selected_symbols.len() >= 2 {
            let base_closes: Vec<f64> = rows.iter().map(|r| r.closes[0]).collect();
            let hedge_closes: Vec<f64> = rows.iter().map(|r| r.closes[1]).collect();
            let latest_in_order: Vec<f64> = config
                .selected_symbols
                .iter()
                .map(|s| latest_prices.get(s).copied().unwrap_or(0.0))
                .collect();
            let previous_in_order: Vec<f64> = config
                .selected_symbols
                .iter()
                .map(|s| previous_by_symbol.get(s).copied().unwrap_or_else(|| latest_prices.get(s).copied().unwrap_or(0.0)))
                .collect();

            let engine = state.analytics_engine.read();
            Some(engine.snapshot(
                now_ms,
                &base_closes,
                &hedge_closes,
                &config.selected_symbols,
                &latest_in_order,
                &previous_in_order,
            ))
        } else {
            None
        };

        if let Some(snapshot) = &snapshot {
            // AnalyticsSnapshot describes the pair as a whole, not a single
            // symbol, so it's evaluated once per tick rather than once per
            // configured symbol (which would just duplicate the same alert
            // under distinct symbol tags).
            state.alerts.evaluate(snapshot, None, config.z_score_threshold, now_ms);
            *state.last_snapshot.write() = Some(snapshot.clone());
        }

        broadcast_tick(&state, now_ms, &latest_prices, snapshot.as_ref());
        previous_by_symbol = latest_prices.clone();
    }
}

/// Push the five wrapped topics plus the unwrapped `analytics` message. Falls
/// back to spread=0/z=0/correlation=0 when analytics could not be computed
/// (§4.H: "Fallback values ... used for the combined broadcast when
/// analytics could not be computed").
fn broadcast_tick(state: &Arc<AppState>, now_ms: i64, latest_prices: &HashMap<String, f64>, snapshot: Option<&AnalyticsSnapshot>) {
    let (spread, z_score, correlation) = snapshot.map(|s| (s.spread, s.z_score, s.correlation)).unwrap_or((0.0, 0.0, 0.0));

    state.broadcast.publish(
        Topic::Prices,
        &Envelope {
            kind: "prices",
            data: latest_prices,
            timestamp_ms: now_ms,
        },
    );
    state.broadcast.publish(
        Topic::Spread,
        &Envelope {
            kind: "spread",
            data: serde_json::json!({ "spread": spread, "z_score": z_score }),
            timestamp_ms: now_ms,
        },
    );
    state.broadcast.publish(
        Topic::Correlation,
        &Envelope {
            kind: "correlation",
            data: serde_json::json!({ "correlation": correlation }),
            timestamp_ms: now_ms,
        },
    );
    if let Some(snapshot) = snapshot {
        state.broadcast.publish(
            Topic::Summary,
            &Envelope {
                kind: "summary",
                data: snapshot,
                timestamp_ms: now_ms,
            },
        );
    }

    state.broadcast.publish(
        Topic::Analytics,
        &AnalyticsMessage {
            timestamp: crate::types::format_iso8601_secs(now_ms),
            prices: latest_prices.clone(),
            spread,
            z_score,
            correlation,
        },
    );
}

/// Wrapper used for the `prices`/`spread`/`correlation`/`summary`/`alerts`
/// topics per §6: `{type, data, timestamp_ms}`.
#[derive(Serialize)]
struct Envelope<T: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: T,
    timestamp_ms: i64,
}

/// The `analytics` topic's unwrapped shape per §6.
#[derive(Serialize)]
struct AnalyticsMessage {
    timestamp: String,
    prices: HashMap<String, f64>,
    spread: f64,
    z_score: f64,
    correlation: f64,
}
