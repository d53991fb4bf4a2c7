//! Authentication handlers: register, login, current user.

use axum::{
    extract::{Extension, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::middleware::auth::{issue_token, AuthExtension};
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::user::UserResponse;
use crate::services::rbac_service::RbacService;
use crate::services::user_service::{NewUser, UserService};

pub fn router() -> Router<SharedState> {
    Router::new().route("/register", post(register)).route("/login", post(login))
}

/// Routes behind the auth middleware.
pub fn protected_router() -> Router<SharedState> {
    Router::new().route("/me", get(me))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    /// Join this organization with its default member role.
    pub organization_id: Option<Uuid>,
}

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<SharedState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<UserResponse>> {
    let service = UserService::new(state.db.clone());
    let user = service
        .create(NewUser {
            email: payload.email,
            first_name: payload.first_name,
            last_name: payload.last_name,
            password: Some(payload.password),
            phone: None,
            image_url: None,
        })
        .await?;

    if let Some(org) = payload.organization_id {
        let rbac = RbacService::new(state.db.clone());
        let role = rbac.default_role(org).await?;
        rbac.assign_role(user.id, org, role.id, None).await?;
    }

    state.event_bus.emit("user.created", user.id, Some(user.email.clone()));
    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Organization to scope the token to. Defaults to the user's first org.
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
    pub organization_id: Option<Uuid>,
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let users = UserService::new(state.db.clone());
    let user = users.authenticate(&payload.email, &payload.password).await?;

    let rbac = RbacService::new(state.db.clone());
    let memberships = rbac.user_organizations(user.id).await?;
    let organization_id = match payload.organization_id {
        Some(requested) => {
            if !memberships.contains(&requested) {
                return Err(AppError::Authorization(
                    "Not a member of the requested organization".into(),
                ));
            }
            Some(requested)
        }
        None => memberships.first().copied(),
    };

    let token = issue_token(
        &state.config.jwt_secret,
        state.config.jwt_expiration_hours,
        user.id,
        &user.email,
        organization_id,
    )?;
    Ok(Json(LoginResponse {
        token,
        user: user.into(),
        organization_id,
    }))
}

/// GET /api/v1/auth/me
pub async fn me(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
) -> Result<Json<UserResponse>> {
    let user = UserService::new(state.db.clone()).get(auth.user_id).await?;
    Ok(Json(user.into()))
}
