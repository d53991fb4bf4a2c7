//! Provider connection models. A connection stores the OAuth credential set
//! linking an organization to one Xero or QuickBooks account; the tenants
//! reachable through that credential set live in `provider_tenants`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Database row. Access and refresh tokens are stored encrypted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Connection {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// e.g. "accounting"
    pub category: String,
    /// "xero" or "quickbooks"
    pub provider: String,
    pub name: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds, as reported by the provider.
    pub expires_in: i64,
    pub token_created_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Whether the stored access token has passed its lifetime, with a
    /// 60 second safety margin so we refresh slightly early.
    pub fn token_expired(&self) -> bool {
        let expiry = self.token_created_at + Duration::seconds(self.expires_in - 60);
        Utc::now() >= expiry
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ProviderTenant {
    pub id: Uuid,
    pub connection_id: Uuid,
    /// Provider-side tenant identifier (Xero tenantId, QuickBooks realmId).
    pub tenant_id: String,
    pub tenant_name: Option<String>,
    /// Xero connection id, used for disconnects.
    pub external_connection_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Connection representation returned by the API. Tokens are never exposed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionResponse {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub category: String,
    pub provider: String,
    pub name: String,
    pub token_expired: bool,
    pub has_refresh_token: bool,
    pub metadata: Option<serde_json::Value>,
    pub tenants: Vec<ProviderTenant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionResponse {
    pub fn from_connection(conn: Connection, tenants: Vec<ProviderTenant>) -> Self {
        let token_expired = conn.token_expired();
        Self {
            id: conn.id,
            organization_id: conn.organization_id,
            category: conn.category,
            provider: conn.provider,
            name: conn.name,
            token_expired,
            has_refresh_token: conn.refresh_token.is_some(),
            metadata: conn.metadata,
            tenants,
            created_at: conn.created_at,
            updated_at: conn.updated_at,
        }
    }
}
