//! Connection persistence and token lifecycle.
//!
//! Tokens are encrypted before insert and decrypted on read. Several stored
//! connections can share one provider refresh token (one per tenant the user
//! authorized); a refresh through any of them must update all of them, which
//! is what `sync_tokens_for_refresh_token` does.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::connection::{Connection, ProviderTenant};
use crate::services::token_cipher::TokenCipher;

/// Decrypted credentials for outbound provider calls. Never serialized.
#[derive(Debug, Clone)]
pub struct DecryptedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

pub struct NewConnection {
    pub organization_id: Uuid,
    pub category: String,
    pub provider: String,
    pub name: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub metadata: Option<serde_json::Value>,
}

pub struct ConnectionService {
    db: PgPool,
    cipher: TokenCipher,
}

impl ConnectionService {
    pub fn new(db: PgPool, cipher: TokenCipher) -> Self {
        Self { db, cipher }
    }

    pub async fn create(&self, new: NewConnection) -> Result<Connection> {
        let access = self.cipher.encrypt(&new.access_token)?;
        let refresh = match &new.refresh_token {
            Some(token) => Some(self.cipher.encrypt(token)?),
            None => None,
        };

        let conn = sqlx::query_as::<_, Connection>(
            r#"
            INSERT INTO connections
                (organization_id, category, provider, name, access_token, refresh_token,
                 expires_in, token_created_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), $8)
            RETURNING *
            "#,
        )
        .bind(new.organization_id)
        .bind(&new.category)
        .bind(&new.provider)
        .bind(&new.name)
        .bind(&access)
        .bind(&refresh)
        .bind(new.expires_in)
        .bind(&new.metadata)
        .fetch_one(&self.db)
        .await?;
        Ok(conn)
    }

    pub async fn get(&self, id: Uuid) -> Result<Connection> {
        sqlx::query_as::<_, Connection>("SELECT * FROM connections WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Connection {id} not found")))
    }

    /// Fetch a connection scoped to an organization. 404 when it belongs to
    /// a different org, so ids never leak across tenant boundaries.
    pub async fn get_for_org(&self, id: Uuid, organization_id: Uuid) -> Result<Connection> {
        sqlx::query_as::<_, Connection>(
            "SELECT * FROM connections WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Connection {id} not found")))
    }

    pub async fn list_for_org(&self, organization_id: Uuid) -> Result<Vec<Connection>> {
        let rows = sqlx::query_as::<_, Connection>(
            "SELECT * FROM connections WHERE organization_id = $1 ORDER BY created_at DESC",
        )
        .bind(organization_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn rename(&self, id: Uuid, name: &str) -> Result<Connection> {
        sqlx::query_as::<_, Connection>(
            "UPDATE connections SET name = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Connection {id} not found")))
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM connections WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Connection {id} not found")));
        }
        Ok(())
    }

    pub fn decrypt_tokens(&self, conn: &Connection) -> Result<DecryptedTokens> {
        let access_token = self.cipher.decrypt(&conn.access_token)?;
        let refresh_token = match &conn.refresh_token {
            Some(encrypted) => Some(self.cipher.decrypt(encrypted)?),
            None => None,
        };
        Ok(DecryptedTokens {
            access_token,
            refresh_token,
        })
    }

    /// Store new tokens on one connection after a refresh.
    pub async fn update_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in: i64,
    ) -> Result<Connection> {
        let access = self.cipher.encrypt(access_token)?;
        let refresh = match refresh_token {
            Some(token) => Some(self.cipher.encrypt(token)?),
            None => None,
        };
        sqlx::query_as::<_, Connection>(
            r#"
            UPDATE connections
            SET access_token = $2,
                refresh_token = COALESCE($3, refresh_token),
                expires_in = $4,
                token_created_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&access)
        .bind(&refresh)
        .bind(expires_in)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Connection {id} not found")))
    }

    /// Propagate refreshed tokens to every sibling connection that held the
    /// same (old) refresh token. Providers rotate refresh tokens on use, so
    /// siblings left with the old one would be stranded at their next call.
    pub async fn sync_tokens_for_refresh_token(
        &self,
        organization_id: Uuid,
        provider: &str,
        old_refresh_token: &str,
        new_access_token: &str,
        new_refresh_token: &str,
        expires_in: i64,
    ) -> Result<u64> {
        let candidates = sqlx::query_as::<_, Connection>(
            "SELECT * FROM connections WHERE organization_id = $1 AND provider = $2 AND refresh_token IS NOT NULL",
        )
        .bind(organization_id)
        .bind(provider)
        .fetch_all(&self.db)
        .await?;

        let mut updated = 0;
        for conn in candidates {
            let stored = match &conn.refresh_token {
                Some(encrypted) => self.cipher.decrypt(encrypted)?,
                None => continue,
            };
            if stored != old_refresh_token {
                continue;
            }
            self.update_tokens(conn.id, new_access_token, Some(new_refresh_token), expires_in)
                .await?;
            updated += 1;
        }
        Ok(updated)
    }

    /// Find the org's connection already holding the given provider tenant.
    /// Used on OAuth callback so re-authorizing the same tenant updates the
    /// existing connection instead of creating a duplicate.
    pub async fn find_by_tenant(
        &self,
        organization_id: Uuid,
        provider: &str,
        tenant_id: &str,
    ) -> Result<Option<Connection>> {
        let conn = sqlx::query_as::<_, Connection>(
            r#"
            SELECT c.*
            FROM connections c
            JOIN provider_tenants pt ON pt.connection_id = c.id
            WHERE c.organization_id = $1 AND c.provider = $2 AND pt.tenant_id = $3
            LIMIT 1
            "#,
        )
        .bind(organization_id)
        .bind(provider)
        .bind(tenant_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(conn)
    }

    // ===== Tenants =====

    pub async fn list_tenants(&self, connection_id: Uuid) -> Result<Vec<ProviderTenant>> {
        let rows = sqlx::query_as::<_, ProviderTenant>(
            "SELECT * FROM provider_tenants WHERE connection_id = $1 ORDER BY created_at",
        )
        .bind(connection_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    /// Idempotent tenant registration; re-adding updates name and external id.
    pub async fn upsert_tenant(
        &self,
        connection_id: Uuid,
        tenant_id: &str,
        tenant_name: Option<&str>,
        external_connection_id: Option<&str>,
    ) -> Result<ProviderTenant> {
        let row = sqlx::query_as::<_, ProviderTenant>(
            r#"
            INSERT INTO provider_tenants (connection_id, tenant_id, tenant_name, external_connection_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (connection_id, tenant_id)
            DO UPDATE SET tenant_name = EXCLUDED.tenant_name,
                          external_connection_id = EXCLUDED.external_connection_id
            RETURNING *
            "#,
        )
        .bind(connection_id)
        .bind(tenant_id)
        .bind(tenant_name)
        .bind(external_connection_id)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    pub async fn remove_tenant(&self, connection_id: Uuid, tenant_id: &str) -> Result<ProviderTenant> {
        sqlx::query_as::<_, ProviderTenant>(
            "DELETE FROM provider_tenants WHERE connection_id = $1 AND tenant_id = $2 RETURNING *",
        )
        .bind(connection_id)
        .bind(tenant_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Tenant {tenant_id} not found on connection {connection_id}"
            ))
        })
    }

    pub async fn get_tenant(&self, connection_id: Uuid, tenant_id: &str) -> Result<ProviderTenant> {
        sqlx::query_as::<_, ProviderTenant>(
            "SELECT * FROM provider_tenants WHERE connection_id = $1 AND tenant_id = $2",
        )
        .bind(connection_id)
        .bind(tenant_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Tenant {tenant_id} not found on connection {connection_id}"
            ))
        })
    }
}
