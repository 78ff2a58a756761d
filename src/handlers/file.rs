//! File handlers

use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::entity::file::FileItem;
use crate::error::{AppError, AppResult};
use crate::handlers::{attachment, ok, ApiResult};
use crate::middleware::auth::CurrentUser;
use crate::service::{FavoriteState, NewUpload};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct FavoriteResponse {
    pub state: FavoriteState,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::Validation(format!("invalid multipart body: {}", e.body_text()))
    }
}

/// POST /api/folders/:id/upload
///
/// Multipart form with a single `file` field.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(folder_id): Path<i32>,
    mut multipart: Multipart,
) -> ApiResult<FileItem> {
    let mut upload: Option<NewUpload> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        tracing::debug!("Parsing field: {}", name);
        if name != "file" {
            continue;
        }

        let original_name = field.file_name().unwrap_or("").to_string();
        let mime_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some(NewUpload {
            folder_id,
            original_name,
            mime_type,
            bytes: bytes.to_vec(),
        });
    }

    let Some(upload) = upload else {
        return Err(AppError::Validation("missing file field".to_string()));
    };
    let created = state.drive.upload_file(&current_user, upload).await?;
    ok(created.into())
}

/// GET /api/files/:id/download
pub async fn download_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    let download = state.drive.download_file(&current_user, id).await?;
    let content_type = HeaderValue::from_str(&download.file.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, download.file.size.max(0))
        .header(
            header::CONTENT_DISPOSITION,
            attachment(&download.file.original_name),
        )
        .body(Body::from_stream(download.stream))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

/// POST /api/files/:id/rename
pub async fn rename_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(req): Json<RenameRequest>,
) -> ApiResult<FileItem> {
    let renamed = state.drive.rename_file(&current_user, id, &req.name).await?;
    ok(renamed.into())
}

/// POST /api/files/:id/delete
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> ApiResult<()> {
    state.drive.soft_delete_file(&current_user, id).await?;
    ok(())
}

/// POST /api/files/:id/restore
pub async fn restore_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> ApiResult<FileItem> {
    let restored = state.drive.restore_file(&current_user, id).await?;
    ok(restored.into())
}

/// POST /api/files/:id/purge
pub async fn purge_file(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> ApiResult<()> {
    state.drive.purge_file(&current_user, id).await?;
    ok(())
}

/// POST /api/files/:id/favorite
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> ApiResult<FavoriteResponse> {
    let now = state.drive.toggle_favorite(&current_user, id).await?;
    ok(FavoriteResponse { state: now })
}

/// GET /api/favorites
pub async fn list_favorites(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> ApiResult<Vec<FileItem>> {
    let files = state.drive.list_favorites(&current_user).await?;
    ok(files.into_iter().map(FileItem::from).collect())
}
