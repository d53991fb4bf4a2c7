//! Cache introspection and invalidation handlers.

use axum::{
    extract::{Extension, Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::middleware::auth::AuthExtension;
use crate::api::SharedState;
use crate::error::Result;
use crate::services::cache_service::{CacheStats, McpCacheStore};
use crate::services::connection_service::ConnectionService;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/stats", get(cache_stats))
        .route("/connections/:id", delete(invalidate_connection))
}

/// GET /api/v1/cache/stats
pub async fn cache_stats(State(state): State<SharedState>) -> Result<Json<CacheStats>> {
    let db_rows = McpCacheStore::new(state.db.clone()).count().await?;
    Ok(Json(CacheStats {
        connection_tier: state.cache.connections.stats(),
        mcp_tier: state.cache.mcp.stats(),
        db_rows,
    }))
}

#[derive(Debug, Deserialize)]
pub struct InvalidateQuery {
    pub tenant_id: Option<String>,
    pub cache_key: Option<String>,
}

/// DELETE /api/v1/cache/connections/:id
///
/// Drops cached provider data for a connection, optionally scoped to one
/// tenant or one cache key. Both the in-memory tier and the database tier
/// are cleared.
pub async fn invalidate_connection(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
    Query(query): Query<InvalidateQuery>,
) -> Result<Json<serde_json::Value>> {
    // Cross-org ids must 404 before anything is touched
    ConnectionService::new(state.db.clone(), state.token_cipher.clone())
        .get_for_org(id, auth.org()?)
        .await?;

    let tenant = query.tenant_id.as_deref();
    let key = query.cache_key.as_deref();
    if tenant.is_none() && key.is_none() {
        state.cache.invalidate_connection(id);
    } else {
        state.cache.invalidate_mcp(id, tenant, key);
    }
    let removed = McpCacheStore::new(state.db.clone())
        .invalidate(id, tenant, key)
        .await?;
    Ok(Json(json!({"removed_rows": removed})))
}
