//! Trash handlers

use axum::{extract::State, Extension};

use crate::handlers::{ok, ApiResult};
use crate::middleware::auth::CurrentUser;
use crate::service::{TrashListing, TrashSummary};
use crate::state::AppState;

/// GET /api/trash
pub async fn list_trash(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> ApiResult<TrashListing> {
    ok(state.drive.list_trash(&current_user).await?)
}

/// POST /api/trash/empty
pub async fn empty_trash(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> ApiResult<TrashSummary> {
    ok(state.drive.empty_trash(&current_user).await?)
}
