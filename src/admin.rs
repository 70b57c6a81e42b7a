//! Minimal admin HTTP surface: healthz, metrics, and the test-notification
//! hook (§4.5). The full admin web UI (rule authoring, login/session) is
//! out of scope; this is just enough surface to probe and operate a
//! running engine.

use crate::engine::Engine;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/test-notify", post(test_notify))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

async fn healthz(State(engine): State<Arc<Engine>>) -> (StatusCode, Json<serde_json::Value>) {
    match engine.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "error": err })),
        ),
    }
}

async fn metrics() -> String {
    crate::metrics::render()
}

async fn test_notify(State(engine): State<Arc<Engine>>) -> (StatusCode, Json<serde_json::Value>) {
    match engine.send_test_notification().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "sent" }))),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "status": "error", "error": err.to_string() })),
        ),
    }
}
