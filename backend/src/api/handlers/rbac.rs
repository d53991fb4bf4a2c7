//! RBAC handlers: global permissions, org-scoped roles, assignments.

use axum::{
    extract::{Extension, Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::middleware::auth::AuthExtension;
use crate::api::SharedState;
use crate::error::Result;
use crate::models::rbac::{OrgRole, Permission, RoleWithPermissions, UserOrgRole};
use crate::services::rbac_service::RbacService;

pub fn permissions_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_permissions).post(create_permission))
        .route("/by-resource", get(list_permissions_by_resource))
        .route("/:id", delete(delete_permission))
}

pub fn roles_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/:id", get(get_role).delete(delete_role))
        .route(
            "/:id/permissions/:permission_id",
            axum::routing::post(grant_permission).delete(revoke_permission),
        )
        .route("/assignments", axum::routing::post(assign_role))
        .route(
            "/assignments/:user_id/:role_id",
            delete(remove_assignment),
        )
        .route("/users/:user_id", get(user_roles))
        .route("/check", get(check_permission))
}

// ===== Permissions =====

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePermissionRequest {
    pub name: String,
    pub description: Option<String>,
    pub resource: String,
    pub action: String,
}

/// POST /api/v1/permissions
pub async fn create_permission(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Json(payload): Json<CreatePermissionRequest>,
) -> Result<Json<Permission>> {
    let permission = RbacService::new(state.db.clone())
        .create_permission(
            &payload.name,
            payload.description.as_deref(),
            &payload.resource,
            &payload.action,
        )
        .await?;
    state
        .event_bus
        .emit("permission.created", permission.id, Some(auth.email));
    Ok(Json(permission))
}

/// GET /api/v1/permissions
pub async fn list_permissions(
    State(state): State<SharedState>,
) -> Result<Json<Vec<Permission>>> {
    let permissions = RbacService::new(state.db.clone()).list_permissions().await?;
    Ok(Json(permissions))
}

/// GET /api/v1/permissions/by-resource
///
/// Same catalog as the flat listing, grouped by resource for pickers.
pub async fn list_permissions_by_resource(
    State(state): State<SharedState>,
) -> Result<Json<std::collections::BTreeMap<String, Vec<Permission>>>> {
    let permissions = RbacService::new(state.db.clone()).list_permissions().await?;
    let mut grouped: std::collections::BTreeMap<String, Vec<Permission>> =
        std::collections::BTreeMap::new();
    for permission in permissions {
        grouped
            .entry(permission.resource.clone())
            .or_default()
            .push(permission);
    }
    Ok(Json(grouped))
}

/// DELETE /api/v1/permissions/:id
pub async fn delete_permission(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<()> {
    RbacService::new(state.db.clone()).delete_permission(id).await?;
    state.event_bus.emit("permission.deleted", id, Some(auth.email));
    Ok(())
}

// ===== Roles =====

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: Option<String>,
}

/// POST /api/v1/roles
pub async fn create_role(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Json(payload): Json<CreateRoleRequest>,
) -> Result<Json<OrgRole>> {
    let role = RbacService::new(state.db.clone())
        .create_role(
            auth.org()?,
            &payload.name,
            payload.description.as_deref(),
            Some(auth.user_id),
        )
        .await?;
    state.event_bus.emit("role.created", role.id, Some(auth.email));
    Ok(Json(role))
}

/// GET /api/v1/roles
pub async fn list_roles(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
) -> Result<Json<Vec<OrgRole>>> {
    let roles = RbacService::new(state.db.clone())
        .list_roles(auth.org()?)
        .await?;
    Ok(Json(roles))
}

/// GET /api/v1/roles/:id
pub async fn get_role(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoleWithPermissions>> {
    let service = RbacService::new(state.db.clone());
    let role = service.get_role(id).await?;
    let permissions = service.role_permissions(id).await?;
    Ok(Json(RoleWithPermissions { role, permissions }))
}

/// DELETE /api/v1/roles/:id
pub async fn delete_role(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<()> {
    RbacService::new(state.db.clone()).delete_role(id).await?;
    state.event_bus.emit("role.deleted", id, Some(auth.email));
    Ok(())
}

/// POST /api/v1/roles/:id/permissions/:permission_id
pub async fn grant_permission(
    State(state): State<SharedState>,
    Path((role_id, permission_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<crate::models::rbac::RolePermission>> {
    let grant = RbacService::new(state.db.clone())
        .grant_permission(role_id, permission_id)
        .await?;
    Ok(Json(grant))
}

/// DELETE /api/v1/roles/:id/permissions/:permission_id
pub async fn revoke_permission(
    State(state): State<SharedState>,
    Path((role_id, permission_id)): Path<(Uuid, Uuid)>,
) -> Result<()> {
    RbacService::new(state.db.clone())
        .revoke_permission(role_id, permission_id)
        .await
}

// ===== Assignments =====

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub user_id: Uuid,
    pub role_id: Uuid,
}

/// POST /api/v1/roles/assignments
pub async fn assign_role(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Json(payload): Json<AssignRoleRequest>,
) -> Result<Json<UserOrgRole>> {
    let assignment = RbacService::new(state.db.clone())
        .assign_role(
            payload.user_id,
            auth.org()?,
            payload.role_id,
            Some(auth.user_id),
        )
        .await?;
    Ok(Json(assignment))
}

/// DELETE /api/v1/roles/assignments/:user_id/:role_id
pub async fn remove_assignment(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path((user_id, role_id)): Path<(Uuid, Uuid)>,
) -> Result<()> {
    RbacService::new(state.db.clone())
        .remove_role(user_id, auth.org()?, role_id)
        .await
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckPermissionQuery {
    pub resource: String,
    pub action: String,
}

/// GET /api/v1/roles/check?resource=...&action=...
///
/// Whether any of the caller's roles in the current org grants the
/// resource/action pair.
pub async fn check_permission(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Query(query): Query<CheckPermissionQuery>,
) -> Result<Json<serde_json::Value>> {
    let allowed = RbacService::new(state.db.clone())
        .user_has_permission(auth.user_id, auth.org()?, &query.resource, &query.action)
        .await?;
    Ok(Json(serde_json::json!({"allowed": allowed})))
}

/// GET /api/v1/roles/users/:user_id
pub async fn user_roles(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<OrgRole>>> {
    let roles = RbacService::new(state.db.clone())
        .user_roles(user_id, auth.org()?)
        .await?;
    Ok(Json(roles))
}
