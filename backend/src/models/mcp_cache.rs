//! Persistent (database) tier of the MCP data cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct McpDataCache {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub connection_id: Uuid,
    pub tenant_id: String,
    /// Tool name plus canonicalized arguments, e.g. "list-invoices:page=1".
    pub cache_key: String,
    pub data: serde_json::Value,
    pub cached_at: DateTime<Utc>,
}
