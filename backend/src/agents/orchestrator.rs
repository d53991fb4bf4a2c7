//! Runs one payroll risk analysis end to end, persisting progress so the
//! API can report on the row while the run is in flight.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::agents::engine::AssessmentEngine;
use crate::agents::gatherer::{CacheContext, DataGatherer};
use crate::agents::planner::RiskPlanner;
use crate::agents::summarizer::SummarizationAgent;
use crate::agents::world_state::WorldState;
use crate::clients::llm::LlmEngine;
use crate::clients::xero::XeroClient;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::mcp::client::McpClient;
use crate::services::cache_service::{CacheService, McpCacheStore};
use crate::services::event_bus::EventBus;
use crate::services::payroll_risk_service::PayrollRiskService;

pub struct AnalysisContext {
    pub analysis_id: Uuid,
    pub organization_id: Uuid,
    pub connection_id: Uuid,
    pub tenant_id: String,
    /// Decrypted provider access token, refreshed by the caller.
    pub access_token: String,
}

pub struct PayrollRiskAgent {
    db: PgPool,
    config: Config,
    http: reqwest::Client,
    cache: Arc<CacheService>,
    event_bus: Arc<EventBus>,
    llm: Box<dyn LlmEngine>,
}

impl PayrollRiskAgent {
    pub fn new(
        db: PgPool,
        config: Config,
        http: reqwest::Client,
        cache: Arc<CacheService>,
        event_bus: Arc<EventBus>,
        llm: Box<dyn LlmEngine>,
    ) -> Self {
        Self {
            db,
            config,
            http,
            cache,
            event_bus,
            llm,
        }
    }

    /// Run the analysis, finishing the row as completed or failed. Meant to
    /// be spawned; never returns an error to the caller.
    pub async fn run(self, ctx: AnalysisContext) {
        let service = PayrollRiskService::new(self.db.clone());
        match self.execute(&ctx).await {
            Ok(result) => {
                if let Err(e) = service.complete(ctx.analysis_id, &result).await {
                    tracing::error!("Failed to store analysis result: {}", e);
                }
                self.event_bus
                    .emit("analysis.completed", ctx.analysis_id, None);
                tracing::info!("Analysis {} completed", ctx.analysis_id);
            }
            Err(e) => {
                tracing::warn!("Analysis {} failed: {}", ctx.analysis_id, e);
                if let Err(store_err) = service.fail(ctx.analysis_id, &e.to_string()).await {
                    tracing::error!("Failed to mark analysis failed: {}", store_err);
                }
                self.event_bus.emit("analysis.failed", ctx.analysis_id, None);
            }
        }
    }

    async fn execute(&self, ctx: &AnalysisContext) -> Result<serde_json::Value> {
        let service = PayrollRiskService::new(self.db.clone());

        service
            .update_progress(ctx.analysis_id, 5, "Connecting to data provider")
            .await?;
        let mut client = McpClient::spawn(
            &self.config.mcp_server_path,
            &[
                ("XERO_CLIENT_BEARER_TOKEN", ctx.access_token.as_str()),
                ("XERO_TENANT_ID", ctx.tenant_id.as_str()),
            ],
        )
        .await?;
        let tools = client.list_tools().await?;
        tracing::debug!("MCP server exposes {} tools", tools.len());

        service
            .update_progress(ctx.analysis_id, 15, "Gathering financial data")
            .await?;
        let gatherer = DataGatherer::new(Some(CacheContext {
            memory: self.cache.clone(),
            store: McpCacheStore::new(self.db.clone()),
            organization_id: ctx.organization_id,
            connection_id: ctx.connection_id,
            tenant_id: ctx.tenant_id.clone(),
        }));
        let gathered = gatherer.gather(&mut client).await?;
        client.close().await;

        let missing = gathered.missing_critical();
        if !missing.is_empty() {
            return Err(AppError::Mcp(format!(
                "Critical data sources unavailable: {}",
                missing.join(", ")
            )));
        }

        service
            .update_progress(ctx.analysis_id, 55, "Summarizing financial position")
            .await?;
        let mut world_state = SummarizationAgent::summarize(&gathered);
        self.backfill_journal_amounts(ctx, &mut world_state).await;

        service
            .update_progress(ctx.analysis_id, 65, "Planning risk assessment")
            .await?;
        let decision = RiskPlanner::new(self.llm.as_ref()).plan(&world_state).await?;
        if !decision.can_proceed {
            tracing::info!(
                "Planner requested more data ({} slices); proceeding with summaries",
                decision.requests.len()
            );
        }

        service
            .update_progress(ctx.analysis_id, 75, "Running risk assessment")
            .await?;
        let result = AssessmentEngine::new(self.llm.as_ref())
            .assess(&world_state, &gathered, &decision)
            .await?;

        Ok(serde_json::to_value(result)?)
    }

    /// The MCP journal listing sometimes omits totals. Fill zero-amount
    /// payroll journals in from the provider's accounting API directly.
    async fn backfill_journal_amounts(&self, ctx: &AnalysisContext, state: &mut WorldState) {
        let xero = XeroClient::new(self.http.clone(), &self.config);
        for run in state
            .journal_profile
            .payroll_journals
            .iter_mut()
            .filter(|run| run.amount == 0.0 && !run.journal_id.is_empty())
        {
            match xero
                .get_manual_journal(&ctx.access_token, &ctx.tenant_id, &run.journal_id)
                .await
            {
                Ok(detail) => {
                    run.amount = journal_total(&detail);
                }
                Err(e) => {
                    tracing::warn!("Journal {} detail fetch failed: {}", run.journal_id, e);
                }
            }
        }
    }
}

/// Sum of debit lines in a Xero `ManualJournals` detail response.
fn journal_total(detail: &serde_json::Value) -> f64 {
    detail["ManualJournals"][0]["JournalLines"]
        .as_array()
        .map(|lines| {
            lines
                .iter()
                .filter_map(|line| line["LineAmount"].as_f64())
                .filter(|amount| *amount > 0.0)
                .sum()
        })
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn journal_total_sums_debit_lines() {
        let detail = json!({
            "ManualJournals": [{
                "JournalLines": [
                    {"LineAmount": 30000.0},
                    {"LineAmount": 12000.0},
                    {"LineAmount": -42000.0}
                ]
            }]
        });
        assert_eq!(journal_total(&detail), 42000.0);
    }

    #[test]
    fn journal_total_handles_missing_lines() {
        assert_eq!(journal_total(&json!({})), 0.0);
        assert_eq!(journal_total(&json!({"ManualJournals": []})), 0.0);
    }
}
