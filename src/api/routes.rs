//! API route definitions.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::state::AppState;
use crate::detect::DetectError;
use crate::model::{AnomalyRecord, Observation, TransactionStatus};
use crate::storage;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/transactions", post(process_transactions))
        .route("/query", post(query_transactions))
        .route("/baseline/update", post(update_baseline))
        .route("/anomalies", get(recent_anomalies))
}

/// Error envelope for handlers. Validation problems in the batch map to
/// 422, everything else to 500.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(e: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        let status = match e.downcast_ref::<DetectError>() {
            Some(DetectError::MalformedTimeBucket(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: format!("{e:#}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct AnomalyResponse {
    message: String,
    anomalies: Vec<AnomalyRecord>,
}

#[derive(Debug, Deserialize)]
struct TransactionQuery {
    start_hour: Option<String>,
    end_hour: Option<String>,
    status: Option<TransactionStatus>,
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

/// Ingest a batch: persist it, classify it against the current snapshot,
/// persist and dispatch whatever alerts come out.
async fn process_transactions(
    State(state): State<AppState>,
    Json(batch): Json<Vec<Observation>>,
) -> Result<Json<AnomalyResponse>, ApiError> {
    let pool = state.pool.clone();
    let engine = state.engine.clone();

    let anomalies = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<AnomalyRecord>> {
        // Classify before persisting, so a rejected batch leaves no rows.
        let records = engine.detect_anomalies(&batch)?;
        storage::save_observations(&pool, &batch)?;
        if !records.is_empty() {
            storage::save_anomalies(&pool, &records)?;
        }
        Ok(records)
    })
    .await
    .map_err(ApiError::internal)??;

    state.notifier.send_alert(&anomalies).await;

    Ok(Json(AnomalyResponse {
        message: "Transactions processed successfully".to_string(),
        anomalies,
    }))
}

async fn query_transactions(
    State(state): State<AppState>,
    Json(query): Json<TransactionQuery>,
) -> Result<Json<Vec<Observation>>, ApiError> {
    let pool = state.pool.clone();
    let rows = tokio::task::spawn_blocking(move || {
        storage::query_observations(
            &pool,
            query.start_hour.as_deref(),
            query.end_hour.as_deref(),
            query.status,
        )
    })
    .await
    .map_err(ApiError::internal)??;
    Ok(Json(rows))
}

/// Rebuild baseline and outlier model from the full stored history.
async fn update_baseline(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let pool = state.pool.clone();
    let engine = state.engine.clone();

    let (entries, trained, history_rows) =
        tokio::task::spawn_blocking(move || -> anyhow::Result<(usize, bool, usize)> {
            let history = storage::load_observations(&pool)?;
            engine.update_baseline(&history)?;
            let entries = engine.baseline_entries();
            storage::replace_baselines(&pool, &entries)?;
            Ok((entries.len(), engine.is_trained(), history.len()))
        })
        .await
        .map_err(ApiError::internal)??;

    Ok(Json(json!({
        "data": {
            "baseline_entries": entries,
            "model_trained": trained,
            "history_rows": history_rows
        }
    })))
}

async fn recent_anomalies(
    State(state): State<AppState>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let pool = state.pool.clone();
    let limit = params.limit.unwrap_or(50);
    let records = tokio::task::spawn_blocking(move || storage::list_recent_anomalies(&pool, limit))
        .await
        .map_err(ApiError::internal)??;

    let total = records.len();
    Ok(Json(json!({ "data": records, "meta": { "total": total } })))
}
