//! Liveness endpoint.

use axum::Json;
use serde_json::{json, Value};

/// Reports that the webhook receiver is up.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
