//! Liveness and readiness handlers.

use axum::{extract::State, routing::get, Json, Router};
use serde_json::json;

use crate::api::SharedState;
use crate::error::Result;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

/// GET /ready - verifies database connectivity
pub async fn ready(State(state): State<SharedState>) -> Result<Json<serde_json::Value>> {
    sqlx::query("SELECT 1").execute(&state.db).await?;
    Ok(Json(json!({"status": "ready"})))
}
