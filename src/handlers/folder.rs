//! Folder handlers

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::entity::folder::FolderItem;
use crate::error::{AppError, AppResult};
use crate::handlers::{attachment, ok, ApiResult};
use crate::middleware::auth::CurrentUser;
use crate::service::{FolderView, NewFolder, TrashSummary, UserGrant};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PermissionsRequest {
    pub grants: Vec<UserGrant>,
}

#[derive(Debug, Serialize)]
pub struct PermissionsResponse {
    pub notified: usize,
}

fn items(folders: Vec<crate::entity::folder::Model>) -> Vec<FolderItem> {
    folders.into_iter().map(FolderItem::from).collect()
}

/// POST /api/folders
pub async fn create_folder(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<NewFolder>,
) -> ApiResult<FolderItem> {
    let created = state.drive.create_folder(&current_user, req).await?;
    ok(created.into())
}

/// GET /api/folders/home
pub async fn home(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> ApiResult<Vec<FolderItem>> {
    ok(items(state.drive.home_folders(&current_user).await?))
}

/// GET /api/folders/explore
pub async fn explore(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> ApiResult<Vec<FolderItem>> {
    ok(items(state.drive.explore_folders(&current_user).await?))
}

/// GET /api/folders/:id
pub async fn open_folder(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> ApiResult<FolderView> {
    ok(state.drive.open_folder(&current_user, id).await?)
}

/// GET /api/folders/:id/children
pub async fn list_children(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> ApiResult<Vec<FolderItem>> {
    ok(items(state.drive.list_children(&current_user, id).await?))
}

/// POST /api/folders/:id/rename
pub async fn rename_folder(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(req): Json<RenameRequest>,
) -> ApiResult<FolderItem> {
    let renamed = state.drive.rename_folder(&current_user, id, &req.name).await?;
    ok(renamed.into())
}

/// POST /api/folders/:id/delete
pub async fn delete_folder(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> ApiResult<()> {
    state.drive.soft_delete_folder(&current_user, id).await?;
    ok(())
}

/// POST /api/folders/:id/restore
pub async fn restore_folder(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> ApiResult<FolderItem> {
    let restored = state.drive.restore_folder(&current_user, id).await?;
    ok(restored.into())
}

/// POST /api/folders/:id/purge
pub async fn purge_folder(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> ApiResult<TrashSummary> {
    ok(state.drive.purge_folder(&current_user, id).await?)
}

/// GET /api/folders/:id/permissions
pub async fn get_permissions(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> ApiResult<Vec<UserGrant>> {
    ok(state.drive.folder_permissions(&current_user, id).await?)
}

/// POST /api/folders/:id/permissions
pub async fn update_permissions(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(req): Json<PermissionsRequest>,
) -> ApiResult<PermissionsResponse> {
    let notified = state
        .drive
        .update_permissions(&current_user, id, req.grants)
        .await?;
    ok(PermissionsResponse { notified })
}

/// GET /api/folders/:id/download
///
/// Streams the folder subtree as a zip archive.
pub async fn download_folder(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    let export = state.drive.export_folder(&current_user, id).await?;
    let body = Body::from_stream(export.body);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_DISPOSITION, attachment(&export.file_name))
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}
