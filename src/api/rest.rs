// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Router construction follows the teacher's idiom exactly:
// `Router::new().route(...).layer(cors).with_state(state)`. Per §6 the HTTP
// surface is a referenced external contract, not core, and none of its
// endpoints are behind auth (the spec's external-interface section never
// scopes one behind a token) — this is the one place the teacher's Bearer
// middleware (`api/auth.rs`) has no counterpart here.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::runtime_config::RuntimeConfig;
use crate::types::Interval;

// =============================================================================
// Router construction
// =============================================================================

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/settings", post(update_settings))
        .route("/api/alerts", get(alerts))
        .route("/export/:format", get(export))
        .route("/api/v1/ingestion/stats", get(ingestion_stats))
        .route("/ws/:topic", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// GET /api/health — public
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.health_snapshot())
}

// =============================================================================
// POST /api/settings — replaces the Configuration Snapshot
// =============================================================================

async fn update_settings(State(state): State<Arc<AppState>>, Json(new_config): Json<RuntimeConfig>) -> impl IntoResponse {
    info!(symbols = ?new_config.selected_symbols, "configuration snapshot replaced via API");
    state.replace_config(new_config.clone());

    if let Err(e) = new_config.save("runtime_config.json") {
        warn!(error = %e, "failed to persist runtime config after update");
    }

    Json(new_config)
}

// =============================================================================
// GET /api/alerts?limit=N
// =============================================================================

#[derive(Deserialize)]
struct AlertsQuery {
    limit: Option<usize>,
}

async fn alerts(State(state): State<Arc<AppState>>, Query(query): Query<AlertsQuery>) -> impl IntoResponse {
    Json(state.alerts.list(query.limit))
}

// =============================================================================
// GET /api/v1/ingestion/stats — supplemented feature
// =============================================================================

#[derive(Deserialize)]
struct StatsQuery {
    symbol: Option<String>,
}

async fn ingestion_stats(State(state): State<Arc<AppState>>, Query(query): Query<StatsQuery>) -> impl IntoResponse {
    match query.symbol {
        Some(symbol) => match state.ingestion.stats(&symbol) {
            Some(stats) => Json(vec![stats]).into_response(),
            None => (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "unknown symbol" }))).into_response(),
        },
        None => Json(state.ingestion.all_stats()).into_response(),
    }
}

// =============================================================================
// GET /export/{csv|json|parquet}?symbol=&limit=
// =============================================================================

#[derive(Deserialize)]
struct ExportQuery {
    symbol: Option<String>,
    limit: Option<usize>,
}

/// One exported row, per §6: bar columns plus the most recent analytics
/// result repeated across every row (a documented quirk, not a bug — see
/// DESIGN.md).
#[derive(serde::Serialize)]
struct ExportRow {
    bucket_start: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    spread: f64,
    z_score: f64,
    correlation: f64,
}

async fn export(
    State(state): State<Arc<AppState>>,
    Path(format): Path<String>,
    Query(query): Query<ExportQuery>,
) -> impl IntoResponse {
    let config = state.config.read().clone();
    let symbol = query.symbol.unwrap_or_else(|| config.selected_symbols.first().cloned().unwrap_or_default());
    let limit = query.limit.unwrap_or(config.export_max_rows).min(config.export_max_rows);

    let bars = state.resampler.get_bars(&symbol, Interval::OneMinute, limit);
    let (spread, z_score, correlation) = state
        .last_snapshot
        .read()
        .as_ref()
        .map(|s| (s.spread, s.z_score, s.correlation))
        .unwrap_or((0.0, 0.0, 0.0));

    let rows: Vec<ExportRow> = bars
        .into_iter()
        .map(|bar| ExportRow {
            bucket_start: iso8601(bar.bucket_start_ms),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            spread,
            z_score,
            correlation,
        })
        .collect();

    match format.as_str() {
        "json" => Json(rows).into_response(),
        "csv" => csv_response(&rows),
        "parquet" => (
            StatusCode::NOT_IMPLEMENTED,
            Json(serde_json::json!({ "error": "parquet export is not supported" })),
        )
            .into_response(),
        other => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": format!("unknown export format '{other}'") })),
        )
            .into_response(),
    }
}

fn csv_response(rows: &[ExportRow]) -> axum::response::Response {
    use std::fmt::Write as _;

    let mut body = String::from("bucket_start,open,high,low,close,volume,spread,z_score,correlation\n");
    for row in rows {
        let _ = writeln!(
            body,
            "{},{},{},{},{},{},{},{},{}",
            row.bucket_start, row.open, row.high, row.low, row.close, row.volume, row.spread, row.z_score, row.correlation
        );
    }

    (
        [(axum::http::header::CONTENT_TYPE, "text/csv")],
        body,
    )
        .into_response()
}

fn iso8601(instant_ms: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(instant_ms)
        .unwrap_or_else(chrono::Utc::now)
        .to_rfc3339()
}
