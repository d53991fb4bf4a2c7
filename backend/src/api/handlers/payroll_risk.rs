//! Payroll risk analysis handlers: start a run, poll it, list history.

use axum::{
    extract::{Extension, Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::agents::orchestrator::{AnalysisContext, PayrollRiskAgent};
use crate::api::middleware::auth::AuthExtension;
use crate::api::SharedState;
use crate::clients::llm::engine_from_config;
use crate::clients::provider::ProviderClient;
use crate::clients::quickbooks::QuickBooksClient;
use crate::clients::xero::XeroClient;
use crate::error::{AppError, Result};
use crate::models::payroll_risk::{
    AnalysisStatus, PayrollRiskAnalysis, PayrollRiskAnalysisSummary,
};
use crate::services::connection_service::ConnectionService;
use crate::services::payroll_risk_service::PayrollRiskService;

/// Per-organization cap on simultaneously running analyses.
const MAX_CONCURRENT_ANALYSES: i64 = 3;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/analyses", get(list_analyses).post(start_analysis))
        .route("/analyses/:id", get(get_analysis).delete(delete_analysis))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartAnalysisRequest {
    pub connection_id: Uuid,
    pub tenant_id: String,
}

/// POST /api/v1/payroll-risk/analyses
///
/// Creates the analysis row and spawns the agent; returns immediately with
/// the running row so the client can poll progress.
pub async fn start_analysis(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Json(payload): Json<StartAnalysisRequest>,
) -> Result<Json<PayrollRiskAnalysis>> {
    let org = auth.org()?;
    let connections = ConnectionService::new(state.db.clone(), state.token_cipher.clone());
    let conn = connections.get_for_org(payload.connection_id, org).await?;
    ensure_agent_provider(&conn.provider)?;
    let tenant = connections
        .get_tenant(conn.id, &payload.tenant_id)
        .await?;

    // Refresh up front so the agent starts with a live token
    let mut tokens = connections.decrypt_tokens(&conn)?;
    if conn.token_expired() {
        let refresh_token = tokens
            .refresh_token
            .clone()
            .ok_or_else(|| AppError::Validation("Connection token expired and no refresh token is stored".into()))?;
        let response = match conn.provider.as_str() {
            "xero" => {
                XeroClient::new(state.http.clone(), &state.config)
                    .refresh(&refresh_token)
                    .await?
            }
            "quickbooks" => {
                QuickBooksClient::new(state.http.clone(), &state.config)
                    .refresh(&refresh_token)
                    .await?
            }
            other => {
                return Err(AppError::Validation(format!("Unsupported provider '{other}'")));
            }
        };
        let new_refresh = response
            .refresh_token
            .clone()
            .unwrap_or_else(|| refresh_token.clone());
        connections
            .sync_tokens_for_refresh_token(
                org,
                &conn.provider,
                &refresh_token,
                &response.access_token,
                &new_refresh,
                response.expires_in,
            )
            .await?;
        tokens.access_token = response.access_token;
    }

    let service = PayrollRiskService::new(state.db.clone());
    let running = service
        .count_by_status(org, AnalysisStatus::Running)
        .await?;
    if running >= MAX_CONCURRENT_ANALYSES {
        return Err(AppError::Conflict(format!(
            "Organization already has {running} analyses running"
        )));
    }
    let analysis = service
        .create(
            org,
            conn.id,
            Some(conn.name.as_str()),
            &tenant.tenant_id,
            tenant.tenant_name.as_deref(),
        )
        .await?;

    let agent = PayrollRiskAgent::new(
        state.db.clone(),
        state.config.clone(),
        state.http.clone(),
        state.cache.clone(),
        state.event_bus.clone(),
        engine_from_config(state.http.clone(), &state.config),
    );
    let ctx = AnalysisContext {
        analysis_id: analysis.id,
        organization_id: org,
        connection_id: conn.id,
        tenant_id: tenant.tenant_id.clone(),
        access_token: tokens.access_token,
    };
    tokio::spawn(agent.run(ctx));

    state
        .event_bus
        .emit("analysis.started", analysis.id, Some(auth.email));
    Ok(Json(analysis))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub connection_id: Option<Uuid>,
    pub status: Option<AnalysisStatus>,
    pub limit: Option<i64>,
}

/// GET /api/v1/payroll-risk/analyses
pub async fn list_analyses(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PayrollRiskAnalysisSummary>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let rows = PayrollRiskService::new(state.db.clone())
        .list(auth.org()?, query.connection_id, query.status, limit)
        .await?;
    Ok(Json(rows))
}

/// GET /api/v1/payroll-risk/analyses/:id
pub async fn get_analysis(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<Json<PayrollRiskAnalysis>> {
    let analysis = PayrollRiskService::new(state.db.clone())
        .get(id, auth.org()?)
        .await?;
    Ok(Json(analysis))
}

/// DELETE /api/v1/payroll-risk/analyses/:id
pub async fn delete_analysis(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<()> {
    PayrollRiskService::new(state.db.clone())
        .delete(id, auth.org()?)
        .await?;
    state.event_bus.emit("analysis.deleted", id, Some(auth.email));
    Ok(())
}

/// The analysis workflow spawns a Xero MCP server and falls back to Xero's
/// accounting API for journal detail; other providers have no server to run.
fn ensure_agent_provider(provider: &str) -> Result<()> {
    if provider != "xero" {
        return Err(AppError::Validation(format!(
            "Payroll risk analysis requires a Xero connection, not '{provider}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xero_connections_can_run_the_agent() {
        assert!(ensure_agent_provider("xero").is_ok());
    }

    #[test]
    fn other_providers_are_rejected() {
        let err = ensure_agent_provider("quickbooks").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("quickbooks"));
    }

    #[test]
    fn list_query_parses_filters() {
        let query: ListQuery = serde_urlencoded::from_str(
            "status=running&connection_id=7f0e2f86-6f44-4d5b-9c3a-2b1f4a8c9d10&limit=5",
        )
        .unwrap();
        assert_eq!(query.status, Some(AnalysisStatus::Running));
        assert_eq!(query.limit, Some(5));
        assert!(query.connection_id.is_some());
    }

    #[test]
    fn list_query_filters_are_optional() {
        let query: ListQuery = serde_urlencoded::from_str("").unwrap();
        assert_eq!(query.status, None);
        assert_eq!(query.connection_id, None);
        assert_eq!(query.limit, None);
    }
}
