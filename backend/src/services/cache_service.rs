//! Two-tier cache for provider data.
//!
//! Tier one is an in-process TTL cache (per-instance, cheap reads). Tier two
//! is the `mcp_data_cache` table, shared across instances and surviving
//! restarts. Reads check memory first, then the database; writes go to both.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::mcp_cache::McpDataCache;

struct CacheEntry {
    value: serde_json::Value,
    inserted_at: Instant,
}

/// Bounded TTL map. When full, the oldest entry is evicted.
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        if let Some(entry) = self.entries.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        }
        // Expired entries are removed on the read path
        self.entries
            .remove_if(key, |_, e| e.inserted_at.elapsed() >= self.ttl);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn put(&self, key: String, value: serde_json::Value) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().inserted_at)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Remove all entries whose key starts with `prefix`. Returns the count removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        for key in &keys {
            self.entries.remove(key);
        }
        keys.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> TierStats {
        TierStats {
            entries: self.entries.len(),
            max_entries: self.max_entries,
            ttl_seconds: self.ttl.as_secs(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TierStats {
    pub entries: usize,
    pub max_entries: usize,
    pub ttl_seconds: u64,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CacheStats {
    pub connection_tier: TierStats,
    pub mcp_tier: TierStats,
    pub db_rows: i64,
}

/// Both in-memory tiers, shared via `AppState`.
pub struct CacheService {
    /// Decrypted connection lookups, keyed `conn:{connection_id}`.
    pub connections: MemoryCache,
    /// MCP tool results, keyed `mcp:{connection_id}:{tenant_id}:{cache_key}`.
    pub mcp: MemoryCache,
}

impl CacheService {
    pub fn new() -> Self {
        Self {
            connections: MemoryCache::new(64, Duration::from_secs(300)),
            mcp: MemoryCache::new(256, Duration::from_secs(600)),
        }
    }

    pub fn connection_key(connection_id: Uuid) -> String {
        format!("conn:{connection_id}")
    }

    pub fn mcp_key(connection_id: Uuid, tenant_id: &str, cache_key: &str) -> String {
        format!("mcp:{connection_id}:{tenant_id}:{cache_key}")
    }

    pub fn invalidate_connection(&self, connection_id: Uuid) {
        self.connections
            .invalidate_prefix(&Self::connection_key(connection_id));
        self.mcp.invalidate_prefix(&format!("mcp:{connection_id}:"));
    }

    /// Drop MCP entries for a connection, narrowed to a tenant or a single
    /// cache key when given. Without a tenant the key filter is ignored,
    /// since keys only nest under tenants.
    pub fn invalidate_mcp(
        &self,
        connection_id: Uuid,
        tenant_id: Option<&str>,
        cache_key: Option<&str>,
    ) -> usize {
        let prefix = match (tenant_id, cache_key) {
            (Some(tenant), Some(key)) => Self::mcp_key(connection_id, tenant, key),
            (Some(tenant), None) => format!("mcp:{connection_id}:{tenant}:"),
            _ => format!("mcp:{connection_id}:"),
        };
        self.mcp.invalidate_prefix(&prefix)
    }
}

impl Default for CacheService {
    fn default() -> Self {
        Self::new()
    }
}

/// Database tier operations for MCP data.
pub struct McpCacheStore {
    db: PgPool,
}

impl McpCacheStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get(
        &self,
        connection_id: Uuid,
        tenant_id: &str,
        cache_key: &str,
        max_age: chrono::Duration,
    ) -> Result<Option<McpDataCache>> {
        let cutoff: DateTime<Utc> = Utc::now() - max_age;
        let row = sqlx::query_as::<_, McpDataCache>(
            r#"
            SELECT id, organization_id, connection_id, tenant_id, cache_key, data, cached_at
            FROM mcp_data_cache
            WHERE connection_id = $1 AND tenant_id = $2 AND cache_key = $3 AND cached_at >= $4
            "#,
        )
        .bind(connection_id)
        .bind(tenant_id)
        .bind(cache_key)
        .bind(cutoff)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    pub async fn put(
        &self,
        organization_id: Uuid,
        connection_id: Uuid,
        tenant_id: &str,
        cache_key: &str,
        data: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mcp_data_cache (organization_id, connection_id, tenant_id, cache_key, data, cached_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (connection_id, tenant_id, cache_key)
            DO UPDATE SET data = EXCLUDED.data, cached_at = NOW()
            "#,
        )
        .bind(organization_id)
        .bind(connection_id)
        .bind(tenant_id)
        .bind(cache_key)
        .bind(data)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn invalidate(
        &self,
        connection_id: Uuid,
        tenant_id: Option<&str>,
        cache_key: Option<&str>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM mcp_data_cache WHERE connection_id = $1 \
               AND ($2::varchar IS NULL OR tenant_id = $2) \
               AND ($3::varchar IS NULL OR cache_key = $3)",
        )
        .bind(connection_id)
        .bind(tenant_id)
        .bind(cache_key)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }

    /// Drop rows older than `max_age`. Used by the background scheduler.
    pub async fn prune(&self, max_age: chrono::Duration) -> Result<u64> {
        let cutoff: DateTime<Utc> = Utc::now() - max_age;
        let result = sqlx::query("DELETE FROM mcp_data_cache WHERE cached_at < $1")
            .bind(cutoff)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM mcp_data_cache")
            .fetch_one(&self.db)
            .await
            .map_err(AppError::Sqlx)?;
        Ok(count)
    }
}
