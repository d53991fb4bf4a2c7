//! OAuth connect flow: authorization URL issuance and provider callbacks.
//!
//! State tokens are random UUIDs held in a short-lived in-memory store and
//! consumed on callback, which covers the CSRF check.

use axum::{
    extract::{Extension, Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::middleware::auth::AuthExtension;
use crate::api::SharedState;
use crate::clients::provider::{ProviderClient, TokenResponse};
use crate::clients::quickbooks::QuickBooksClient;
use crate::clients::xero::XeroClient;
use crate::error::{AppError, Result};
use crate::models::connection::ConnectionResponse;
use crate::services::connection_service::{ConnectionService, NewConnection};

pub fn router() -> Router<SharedState> {
    Router::new().route("/:provider", get(start_connect))
}

/// Callback routes live outside the auth middleware; the provider's
/// redirect carries no bearer token.
pub fn callback_router() -> Router<SharedState> {
    Router::new().route("/:provider/callback", get(oauth_callback))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectResponse {
    pub authorization_url: String,
    pub state: String,
}

/// GET /api/v1/connect/:provider
pub async fn start_connect(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(provider): Path<String>,
) -> Result<Json<ConnectResponse>> {
    let org = auth.org()?;
    let csrf_state = Uuid::new_v4().to_string();

    let authorization_url = match provider.as_str() {
        "xero" => XeroClient::new(state.http.clone(), &state.config).authorization_url(&csrf_state),
        "quickbooks" => QuickBooksClient::new(state.http.clone(), &state.config)
            .authorization_url(&csrf_state),
        other => {
            return Err(AppError::Validation(format!("Unsupported provider '{other}'")));
        }
    };

    state.oauth_states.put(
        csrf_state.clone(),
        json!({"organization_id": org, "provider": provider}),
    );
    Ok(Json(ConnectResponse {
        authorization_url,
        state: csrf_state,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
    /// QuickBooks delivers the tenant here.
    #[serde(rename = "realmId")]
    pub realm_id: Option<String>,
}

/// GET /api/v1/connect/:provider/callback
pub async fn oauth_callback(
    State(state): State<SharedState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<ConnectionResponse>> {
    let pending = state
        .oauth_states
        .get(&query.state)
        .ok_or_else(|| AppError::OAuth("Unknown or expired OAuth state".into()))?;
    state.oauth_states.remove(&query.state);

    if pending["provider"].as_str() != Some(provider.as_str()) {
        return Err(AppError::OAuth("OAuth state does not match provider".into()));
    }
    let organization_id: Uuid = pending["organization_id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| AppError::OAuth("Corrupt OAuth state".into()))?;

    let service = ConnectionService::new(state.db.clone(), state.token_cipher.clone());
    let conn = match provider.as_str() {
        "xero" => {
            let client = XeroClient::new(state.http.clone(), &state.config);
            let tokens = client.exchange_code(&query.code).await?;
            finish_xero(&state, &service, &client, organization_id, tokens).await?
        }
        "quickbooks" => {
            let client = QuickBooksClient::new(state.http.clone(), &state.config);
            let tokens = client.exchange_code(&query.code).await?;
            let realm_id = query
                .realm_id
                .ok_or_else(|| AppError::OAuth("QuickBooks callback missing realmId".into()))?;
            finish_quickbooks(&state, &service, &client, organization_id, tokens, &realm_id)
                .await?
        }
        other => {
            return Err(AppError::Validation(format!("Unsupported provider '{other}'")));
        }
    };

    state
        .event_bus
        .emit("connection.created", conn.id, None);
    let tenants = service.list_tenants(conn.id).await?;
    Ok(Json(ConnectionResponse::from_connection(conn, tenants)))
}

async fn finish_xero(
    state: &SharedState,
    service: &ConnectionService,
    client: &XeroClient,
    organization_id: Uuid,
    tokens: TokenResponse,
) -> Result<crate::models::connection::Connection> {
    let reachable = client.connections(&tokens.access_token).await?;
    if reachable.is_empty() {
        return Err(AppError::OAuth("Xero returned no authorized tenants".into()));
    }

    // Re-authorizing a known tenant updates that connection in place
    let existing = service
        .find_by_tenant(organization_id, "xero", &reachable[0].tenant_id)
        .await?;
    let conn = match existing {
        Some(existing) => {
            service
                .update_tokens(
                    existing.id,
                    &tokens.access_token,
                    tokens.refresh_token.as_deref(),
                    tokens.expires_in,
                )
                .await?
        }
        None => {
            let name = reachable[0]
                .tenant_name
                .clone()
                .unwrap_or_else(|| "Xero".into());
            service
                .create(NewConnection {
                    organization_id,
                    category: "accounting".into(),
                    provider: "xero".into(),
                    name,
                    access_token: tokens.access_token.clone(),
                    refresh_token: tokens.refresh_token.clone(),
                    expires_in: tokens.expires_in,
                    metadata: tokens.scope.clone().map(|s| json!({"scope": s})),
                })
                .await?
        }
    };

    for tenant in &reachable {
        service
            .upsert_tenant(
                conn.id,
                &tenant.tenant_id,
                tenant.tenant_name.as_deref(),
                Some(tenant.id.as_str()),
            )
            .await?;
    }
    state.cache.invalidate_connection(conn.id);
    Ok(conn)
}

async fn finish_quickbooks(
    state: &SharedState,
    service: &ConnectionService,
    client: &QuickBooksClient,
    organization_id: Uuid,
    tokens: TokenResponse,
    realm_id: &str,
) -> Result<crate::models::connection::Connection> {
    let company_name = match client.company_info(&tokens.access_token, realm_id).await {
        Ok(info) => info.company_name.or(info.legal_name),
        Err(e) => {
            tracing::warn!("Could not fetch QuickBooks company info: {}", e);
            None
        }
    };

    let existing = service
        .find_by_tenant(organization_id, "quickbooks", realm_id)
        .await?;
    let conn = match existing {
        Some(existing) => {
            service
                .update_tokens(
                    existing.id,
                    &tokens.access_token,
                    tokens.refresh_token.as_deref(),
                    tokens.expires_in,
                )
                .await?
        }
        None => {
            service
                .create(NewConnection {
                    organization_id,
                    category: "accounting".into(),
                    provider: "quickbooks".into(),
                    name: company_name.clone().unwrap_or_else(|| "QuickBooks".into()),
                    access_token: tokens.access_token.clone(),
                    refresh_token: tokens.refresh_token.clone(),
                    expires_in: tokens.expires_in,
                    metadata: None,
                })
                .await?
        }
    };

    service
        .upsert_tenant(conn.id, realm_id, company_name.as_deref(), None)
        .await?;
    state.cache.invalidate_connection(conn.id);
    Ok(conn)
}
