//! Router-level API tests, driven in-process without a listener.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use txwatch::api::state::AppState;
use txwatch::api::router;
use txwatch::detect::engine::DetectionEngine;
use txwatch::detect::forest::ForestParams;
use txwatch::notify::AlertNotifier;
use txwatch::storage;

fn test_state(dir: &tempfile::TempDir) -> AppState {
    let path = dir.path().join("api.db");
    let pool = storage::open_pool(path.to_str().unwrap()).unwrap();
    AppState {
        pool,
        engine: Arc::new(DetectionEngine::new(ForestParams::default())),
        notifier: Arc::new(AlertNotifier::new(None)),
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_reports_ok() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(&dir));

    let resp = app
        .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(&dir));

    let resp = app
        .oneshot(Request::get("/api/v1/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_quiet_batch_is_accepted_and_stored() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    let app = router(state.clone());

    let batch = json!([
        {"time": "00h 05", "status": "approved", "count": 50},
        {"time": "00h 05", "status": "failed", "count": 3}
    ]);
    let resp = app
        .clone()
        .oneshot(post_json("/api/v1/transactions", batch))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["anomalies"].as_array().unwrap().len(), 0);

    let resp = app
        .oneshot(post_json("/api/v1/query", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let rows = body_json(resp).await;
    assert_eq!(rows.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_malformed_bucket_rejects_batch_without_storing() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(&dir));

    // The malformed label rides on an approved row; the whole batch must
    // still come back 422 and nothing may be persisted.
    let batch = json!([
        {"time": "00h 05", "status": "failed", "count": 40},
        {"time": "noon", "status": "approved", "count": 10}
    ]);
    let resp = app
        .clone()
        .oneshot(post_json("/api/v1/transactions", batch))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("noon"));

    let resp = app
        .oneshot(post_json("/api/v1/query", json!({})))
        .await
        .unwrap();
    let rows = body_json(resp).await;
    assert!(rows.as_array().unwrap().is_empty());
}
