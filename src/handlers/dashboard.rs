//! Recent activity, search and dashboard counters

use axum::{
    extract::{Query, State},
    Extension,
};
use serde::{Deserialize, Serialize};

use crate::entity::activity::ActivityItem;
use crate::handlers::{ok, ApiResult};
use crate::ledger;
use crate::middleware::auth::CurrentUser;
use crate::service::{SearchResults, UserStats};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct StorageTotal {
    pub total_bytes: u64,
}

/// GET /api/recent
pub async fn recent(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> ApiResult<Vec<ActivityItem>> {
    let feed = ledger::recent_activity(state.drive.db(), current_user.id, ledger::now()).await?;
    ok(feed)
}

/// GET /api/search?q=
pub async fn search(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<SearchResults> {
    ok(state.drive.search(&current_user, &query.q).await?)
}

/// GET /api/storage/total
pub async fn storage_total(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> ApiResult<StorageTotal> {
    let total_bytes = state.drive.storage_total(&current_user).await?;
    ok(StorageTotal { total_bytes })
}

/// GET /api/user-stats
pub async fn user_stats(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> ApiResult<UserStats> {
    ok(state.drive.user_stats(&current_user).await?)
}
