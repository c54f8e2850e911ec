// =============================================================================
// Aurora Stat-Arb Engine — Main Entry Point
// =============================================================================

mod alerts;
mod analytics;
mod api;
mod app_state;
mod bar_finalizer;
mod broadcast;
mod ingestion;
mod orchestrator;
mod resampler;
mod runtime_config;
mod tick_source;
mod types;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::runtime_config::RuntimeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Aurora stat-arb engine starting up");

    let config = RuntimeConfig::load_or_default("runtime_config.json");
    info!(symbols = ?config.selected_symbols, regression = ?config.regression_type, "configuration loaded");

    let state = Arc::new(AppState::new(config));

    orchestrator::spawn_all(state.clone());

    let bind_addr = std::env::var("AURORA_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let api_state = state.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, stopping gracefully");

    if let Err(e) = state.config.read().clone().save("runtime_config.json") {
        tracing::error!(error = %e, "failed to save runtime config on shutdown");
    }

    info!("aurora stat-arb engine shut down complete");
    Ok(())
}
