//! Connection management handlers.

use axum::{
    extract::{Extension, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::middleware::auth::AuthExtension;
use crate::api::SharedState;
use crate::clients::provider::ProviderClient;
use crate::clients::quickbooks::QuickBooksClient;
use crate::clients::xero::XeroClient;
use crate::error::{AppError, Result};
use crate::models::connection::{Connection, ConnectionResponse, ProviderTenant};
use crate::services::connection_service::{ConnectionService, NewConnection};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_connections).post(create_connection))
        .route(
            "/:id",
            get(get_connection)
                .put(rename_connection)
                .delete(delete_connection),
        )
        .route("/:id/refresh", post(refresh_connection))
        .route("/:id/tenants", get(list_tenants))
        .route(
            "/:id/tenants/:tenant_id",
            axum::routing::delete(remove_tenant),
        )
}

fn service(state: &SharedState) -> ConnectionService {
    ConnectionService::new(state.db.clone(), state.token_cipher.clone())
}

async fn to_response(
    service: &ConnectionService,
    conn: Connection,
) -> Result<ConnectionResponse> {
    let tenants = service.list_tenants(conn.id).await?;
    Ok(ConnectionResponse::from_connection(conn, tenants))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateConnectionRequest {
    pub category: String,
    pub provider: String,
    pub name: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// POST /api/v1/connections
///
/// Manual creation with caller-supplied tokens. The OAuth flow under
/// /connect is the usual path.
pub async fn create_connection(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Json(payload): Json<CreateConnectionRequest>,
) -> Result<Json<ConnectionResponse>> {
    if payload.provider != "xero" && payload.provider != "quickbooks" {
        return Err(AppError::Validation(format!(
            "Unsupported provider '{}'",
            payload.provider
        )));
    }

    let service = service(&state);
    let conn = service
        .create(NewConnection {
            organization_id: auth.org()?,
            category: payload.category,
            provider: payload.provider,
            name: payload.name,
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
            expires_in: payload.expires_in.unwrap_or(1800),
            metadata: payload.metadata,
        })
        .await?;

    state
        .event_bus
        .emit("connection.created", conn.id, Some(auth.email));
    Ok(Json(to_response(&service, conn).await?))
}

/// GET /api/v1/connections
pub async fn list_connections(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
) -> Result<Json<Vec<ConnectionResponse>>> {
    let service = service(&state);
    let connections = service.list_for_org(auth.org()?).await?;

    let mut responses = Vec::with_capacity(connections.len());
    for conn in connections {
        responses.push(to_response(&service, conn).await?);
    }
    Ok(Json(responses))
}

/// GET /api/v1/connections/:id
pub async fn get_connection(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConnectionResponse>> {
    let service = service(&state);
    let conn = service.get_for_org(id, auth.org()?).await?;
    Ok(Json(to_response(&service, conn).await?))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenameConnectionRequest {
    pub name: String,
}

/// PUT /api/v1/connections/:id
pub async fn rename_connection(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RenameConnectionRequest>,
) -> Result<Json<ConnectionResponse>> {
    let service = service(&state);
    service.get_for_org(id, auth.org()?).await?;
    let conn = service.rename(id, &payload.name).await?;
    Ok(Json(to_response(&service, conn).await?))
}

/// DELETE /api/v1/connections/:id
pub async fn delete_connection(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<()> {
    let service = service(&state);
    service.get_for_org(id, auth.org()?).await?;
    service.delete(id).await?;
    state.cache.invalidate_connection(id);
    state
        .event_bus
        .emit("connection.deleted", id, Some(auth.email));
    Ok(())
}

/// POST /api/v1/connections/:id/refresh
///
/// Force a token refresh. Sibling connections sharing the refresh token are
/// updated as well, since providers rotate refresh tokens on use.
pub async fn refresh_connection(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConnectionResponse>> {
    let org = auth.org()?;
    let service = service(&state);
    let conn = service.get_for_org(id, org).await?;

    let tokens = service.decrypt_tokens(&conn)?;
    let refresh_token = tokens
        .refresh_token
        .ok_or_else(|| AppError::Validation("Connection has no refresh token".into()))?;

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
    let updated = service
        .sync_tokens_for_refresh_token(
            org,
            &conn.provider,
            &refresh_token,
            &response.access_token,
            &new_refresh,
            response.expires_in,
        )
        .await?;
    tracing::info!("Refreshed tokens on {} connection(s)", updated);
    state.cache.invalidate_connection(id);

    let conn = service.get(id).await?;
    Ok(Json(to_response(&service, conn).await?))
}

/// GET /api/v1/connections/:id/tenants
pub async fn list_tenants(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ProviderTenant>>> {
    let service = service(&state);
    service.get_for_org(id, auth.org()?).await?;
    Ok(Json(service.list_tenants(id).await?))
}

/// DELETE /api/v1/connections/:id/tenants/:tenant_id
///
/// Removes the tenant locally and, for Xero, revokes it upstream too.
pub async fn remove_tenant(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path((id, tenant_id)): Path<(Uuid, String)>,
) -> Result<Json<ProviderTenant>> {
    let service = service(&state);
    let conn = service.get_for_org(id, auth.org()?).await?;
    let tenant = service.get_tenant(id, &tenant_id).await?;

    if conn.provider == "xero" {
        if let Some(external_id) = &tenant.external_connection_id {
            let tokens = service.decrypt_tokens(&conn)?;
            let client = XeroClient::new(state.http.clone(), &state.config);
            if let Err(e) = client.disconnect(&tokens.access_token, external_id).await {
                tracing::warn!("Upstream disconnect failed for tenant {}: {}", tenant_id, e);
            }
        }
    }

    let removed = service.remove_tenant(id, &tenant_id).await?;
    state.cache.invalidate_connection(id);
    state
        .event_bus
        .emit("tenant.removed", format!("{id}:{tenant_id}"), Some(auth.email));
    Ok(Json(removed))
}
