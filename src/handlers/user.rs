//! User administration handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::entity::user::{Role, UserResponse};
use crate::handlers::{ok, ApiResult};
use crate::middleware::auth::CurrentUser;
use crate::service::NewUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> ApiResult<Vec<UserResponse>> {
    let users = state.drive.list_users(&current_user).await?;
    ok(users.into_iter().map(UserResponse::from).collect())
}

/// POST /api/users
pub async fn add_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<NewUser>,
) -> ApiResult<UserResponse> {
    let created = state.drive.create_user(&current_user, req).await?;
    ok(created.into())
}

/// POST /api/users/:id/approve
pub async fn approve_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> ApiResult<UserResponse> {
    let user = state.drive.approve_user(&current_user, id).await?;
    ok(user.into())
}

/// POST /api/users/:id/deactivate
pub async fn deactivate_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> ApiResult<UserResponse> {
    let user = state.drive.deactivate_user(&current_user, id).await?;
    ok(user.into())
}

/// POST /api/users/:id/role
pub async fn change_role(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(req): Json<RoleRequest>,
) -> ApiResult<UserResponse> {
    let user = state.drive.change_role(&current_user, id, req.role).await?;
    ok(user.into())
}

/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> ApiResult<()> {
    state.drive.delete_user(&current_user, id).await?;
    ok(())
}
