//! Background task scheduler.
//!
//! Runs periodic maintenance: pruning stale rows from the MCP data cache and
//! failing analyses that have been stuck in `running` state.

use sqlx::PgPool;
use tokio::time::{interval, Duration};

use crate::services::cache_service::McpCacheStore;
use crate::services::payroll_risk_service::PayrollRiskService;

/// Hard ceiling on how long an analysis may stay `running`.
const ANALYSIS_TIMEOUT_MINUTES: i64 = 30;
/// Database cache rows older than this are pruned.
const CACHE_MAX_AGE_HOURS: i64 = 24;

/// Spawn all background scheduler tasks. Fire-and-forget.
pub fn spawn_all(db: PgPool) {
    // Cache pruning (every hour)
    {
        let db = db.clone();
        tokio::spawn(async move {
            // Initial delay to let the server start up
            tokio::time::sleep(Duration::from_secs(30)).await;
            let store = McpCacheStore::new(db);
            let mut ticker = interval(Duration::from_secs(3600));

            loop {
                ticker.tick().await;
                tracing::debug!("Running MCP cache prune");
                match store.prune(chrono::Duration::hours(CACHE_MAX_AGE_HOURS)).await {
                    Ok(removed) if removed > 0 => {
                        tracing::info!("Pruned {} stale MCP cache rows", removed);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("MCP cache prune failed: {}", e);
                    }
                }
            }
        });
    }

    // Stale analysis reaper (every 5 minutes)
    {
        let db = db.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            let service = PayrollRiskService::new(db);
            let mut ticker = interval(Duration::from_secs(300));

            loop {
                ticker.tick().await;
                match service
                    .fail_stale_running(chrono::Duration::minutes(ANALYSIS_TIMEOUT_MINUTES))
                    .await
                {
                    Ok(failed) if failed > 0 => {
                        tracing::warn!("Marked {} stuck analyses as failed", failed);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Stale analysis sweep failed: {}", e);
                    }
                }
            }
        });
    }

    tracing::info!("Background schedulers started: cache prune, analysis reaper");
}
