//! Liveness and readiness probe.

use axum::{extract::State, http::StatusCode, Json};
use hookline_core::storage::Storage;
use serde_json::json;

/// Pings the database and reports service health.
pub async fn health(State(storage): State<Storage>) -> (StatusCode, Json<serde_json::Value>) {
    match storage.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "error": err.to_string() })),
        ),
    }
}
