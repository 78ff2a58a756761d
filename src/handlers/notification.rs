//! Notification inbox handlers

use axum::{
    extract::{Path, State},
    Extension,
};
use serde::Serialize;

use crate::entity::notification::NotificationItem;
use crate::handlers::{ok, ApiResult};
use crate::ledger;
use crate::middleware::auth::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: u64,
}

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> ApiResult<Vec<NotificationItem>> {
    ok(ledger::notifications(state.drive.db(), current_user.id).await?)
}

/// GET /api/notifications/unread_count
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> ApiResult<UnreadCount> {
    let count = ledger::unread_count(state.drive.db(), current_user.id).await?;
    ok(UnreadCount { count })
}

/// POST /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> ApiResult<()> {
    ledger::mark_read(state.drive.db(), current_user.id, id).await?;
    ok(())
}

/// POST /api/notifications/read_all
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> ApiResult<UnreadCount> {
    let count = ledger::mark_all_read(state.drive.db(), current_user.id).await?;
    ok(UnreadCount { count })
}
