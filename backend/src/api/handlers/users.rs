//! User management handlers.

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
use crate::error::Result;
use crate::models::user::UserResponse;
use crate::services::user_service::{UserService, UserUpdate};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_users))
        .route("/:id", get(get_user).put(update_user))
}

/// GET /api/v1/users
pub async fn list_users(State(state): State<SharedState>) -> Result<Json<Vec<UserResponse>>> {
    let users = UserService::new(state.db.clone()).list().await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

/// GET /api/v1/users/:id
pub async fn get_user(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>> {
    let user = UserService::new(state.db.clone()).get(id).await?;
    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

/// PUT /api/v1/users/:id
pub async fn update_user(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>> {
    let user = UserService::new(state.db.clone())
        .update(
            id,
            UserUpdate {
                first_name: payload.first_name,
                last_name: payload.last_name,
                phone: payload.phone,
                image_url: payload.image_url,
                is_active: payload.is_active,
            },
        )
        .await?;
    state.event_bus.emit("user.updated", id, Some(auth.email));
    Ok(Json(user.into()))
}
