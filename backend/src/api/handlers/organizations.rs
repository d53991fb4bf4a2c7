//! Organization CRUD handlers.

use axum::{
    extract::{Extension, Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::middleware::auth::AuthExtension;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::organization::Organization;
use crate::models::user::UserResponse;
use crate::services::organization_service::{
    NewOrganization, OrganizationService, OrganizationUpdate,
};
use crate::services::rbac_service::RbacService;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_organizations).post(create_organization))
        .route(
            "/:id",
            get(get_organization)
                .put(update_organization)
                .delete(delete_organization),
        )
        .route("/:id/members", get(list_members))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrganizationRequest {
    pub company_name: String,
    pub tax_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// POST /api/v1/organizations
///
/// The creator is granted the system `owner` role.
pub async fn create_organization(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Json(payload): Json<CreateOrganizationRequest>,
) -> Result<Json<Organization>> {
    let service = OrganizationService::new(state.db.clone());
    let org = service
        .create(NewOrganization {
            company_name: payload.company_name,
            tax_id: payload.tax_id,
            phone: payload.phone,
            email: payload.email,
        })
        .await?;

    let rbac = RbacService::new(state.db.clone());
    let owner = rbac
        .create_role(org.id, "owner", Some("Organization owner"), Some(auth.user_id))
        .await?;
    sqlx::query("UPDATE org_roles SET is_system_role = TRUE WHERE id = $1")
        .bind(owner.id)
        .execute(&state.db)
        .await?;
    rbac.assign_role(auth.user_id, org.id, owner.id, Some(auth.user_id))
        .await?;

    state
        .event_bus
        .emit("organization.created", org.id, Some(auth.email));
    Ok(Json(org))
}

/// GET /api/v1/organizations
pub async fn list_organizations(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
) -> Result<Json<Vec<Organization>>> {
    let service = OrganizationService::new(state.db.clone());
    let rbac = RbacService::new(state.db.clone());
    let memberships = rbac.user_organizations(auth.user_id).await?;

    let mut orgs = Vec::with_capacity(memberships.len());
    for org_id in memberships {
        orgs.push(service.get(org_id).await?);
    }
    Ok(Json(orgs))
}

/// Non-members get the same 404 a nonexistent id would, so org ids leak
/// nothing.
fn require_membership(memberships: &[Uuid], id: Uuid) -> Result<()> {
    if !memberships.contains(&id) {
        return Err(AppError::NotFound(format!("Organization {id} not found")));
    }
    Ok(())
}

async fn ensure_member(state: &SharedState, auth: &AuthExtension, id: Uuid) -> Result<()> {
    let memberships = RbacService::new(state.db.clone())
        .user_organizations(auth.user_id)
        .await?;
    require_membership(&memberships, id)
}

/// GET /api/v1/organizations/:id
pub async fn get_organization(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<Json<Organization>> {
    ensure_member(&state, &auth, id).await?;
    let org = OrganizationService::new(state.db.clone()).get(id).await?;
    Ok(Json(org))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrganizationRequest {
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

/// PUT /api/v1/organizations/:id
pub async fn update_organization(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrganizationRequest>,
) -> Result<Json<Organization>> {
    ensure_member(&state, &auth, id).await?;
    let org = OrganizationService::new(state.db.clone())
        .update(
            id,
            OrganizationUpdate {
                company_name: payload.company_name,
                tax_id: payload.tax_id,
                phone: payload.phone,
                email: payload.email,
                is_active: payload.is_active,
            },
        )
        .await?;
    state.event_bus.emit("organization.updated", id, Some(auth.email));
    Ok(Json(org))
}

/// DELETE /api/v1/organizations/:id
pub async fn delete_organization(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<()> {
    ensure_member(&state, &auth, id).await?;
    OrganizationService::new(state.db.clone()).delete(id).await?;
    state.event_bus.emit("organization.deleted", id, Some(auth.email));
    Ok(())
}

/// GET /api/v1/organizations/:id/members
pub async fn list_members(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<UserResponse>>> {
    ensure_member(&state, &auth, id).await?;
    let members = OrganizationService::new(state.db.clone())
        .list_members(id)
        .await?;
    Ok(Json(members.into_iter().map(Into::into).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_pass_the_scope_check() {
        let org = Uuid::new_v4();
        assert!(require_membership(&[Uuid::new_v4(), org], org).is_ok());
    }

    #[test]
    fn non_members_get_not_found() {
        let org = Uuid::new_v4();
        let err = require_membership(&[Uuid::new_v4()], org).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn empty_membership_list_denies() {
        assert!(require_membership(&[], Uuid::new_v4()).is_err());
    }
}
