//! txwatch -- early-warning anomaly alerting for payment transaction pipelines.
//!
//! This crate builds hourly per-status baselines from historical transaction
//! counts, scores live batches with a robust deviation score plus an
//! isolation-forest outlier model, and serves the results over a small
//! HTTP API with webhook alert delivery.

pub mod api;
pub mod config;
pub mod detect;
pub mod ingest;
pub mod model;
pub mod notify;
pub mod storage;

use std::sync::Arc;

use anyhow::Result;

use crate::detect::engine::DetectionEngine;
use crate::notify::AlertNotifier;

/// Start the txwatch daemon: storage, detection engine, API server.
pub async fn serve(cfg: config::Config) -> Result<()> {
    tracing::info!(db_path = %cfg.db_path, "Initializing database");
    let pool = storage::open_pool(&cfg.db_path)?;

    let engine = Arc::new(DetectionEngine::new(cfg.forest.clone()));

    // Seed baseline and model from whatever history is already stored.
    let history = storage::load_observations(&pool)?;
    if history.is_empty() {
        tracing::warn!("no stored history; engine starts untrained (score-only mode)");
    } else {
        engine.update_baseline(&history)?;
        storage::replace_baselines(&pool, &engine.baseline_entries())?;
        tracing::info!(
            history_rows = history.len(),
            trained = engine.is_trained(),
            "engine seeded from stored history"
        );
    }

    let state = api::state::AppState {
        pool,
        engine,
        notifier: Arc::new(AlertNotifier::new(cfg.webhook_url.clone())),
    };

    let addr: std::net::SocketAddr = cfg.bind.parse()?;
    let app = api::router(state);

    tracing::info!(%addr, "txwatch listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
