//! Activity and notification ledger
//!
//! Writes go through the caller's connection so they commit or roll back
//! together with the operation that produced them.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};

use crate::entity::activity::{self, ActivityAction, ActivityItem};
use crate::entity::notification::{self, NotificationItem};
use crate::error::{AppError, AppResult, OptionExt};
use crate::permission;

/// Window of the recent activity feed
pub const RECENT_WINDOW_SECS: i64 = 72 * 3600;

const RECENT_LIMIT: u64 = 200;
const NOTIFICATION_LIMIT: u64 = 100;

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Cut a string to at most `max` characters
fn clip(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

pub async fn log_activity<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    action: ActivityAction,
    file_id: Option<i32>,
    folder_id: Option<i32>,
) -> AppResult<()> {
    activity::ActiveModel {
        user_id: Set(user_id),
        file_id: Set(file_id),
        folder_id: Set(folder_id),
        action: Set(action.as_str().to_string()),
        timestamp: Set(now()),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Append one notification; fan-out is up to the caller
pub async fn notify<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    title: &str,
    message: &str,
    url: &str,
) -> AppResult<notification::Model> {
    let model = notification::ActiveModel {
        user_id: Set(user_id),
        title: Set(clip(title, 100)),
        message: Set(clip(message, 255)),
        url: Set(clip(url, 255)),
        is_read: Set(false),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(model)
}

/// Recent feed for a user.
///
/// Creations and uploads by the user or inside folders the user can read,
/// plus the user's own opens, downloads, renames and deletions.
pub async fn recent_activity<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    now: i64,
) -> AppResult<Vec<ActivityItem>> {
    let since = now - RECENT_WINDOW_SECS;
    let readable: Vec<i32> = permission::readable_folder_ids(conn, user_id)
        .await?
        .into_iter()
        .collect();

    let shared_creations = Condition::all()
        .add(activity::Column::Action.is_in([
            ActivityAction::Created.as_str(),
            ActivityAction::Uploaded.as_str(),
        ]))
        .add(
            Condition::any()
                .add(activity::Column::UserId.eq(user_id))
                .add(activity::Column::FolderId.is_in(readable)),
        );
    let own_actions = Condition::all()
        .add(activity::Column::UserId.eq(user_id))
        .add(activity::Column::Action.is_in([
            ActivityAction::Opened.as_str(),
            ActivityAction::Downloaded.as_str(),
            ActivityAction::Renamed.as_str(),
            ActivityAction::Deleted.as_str(),
        ]));

    let rows = activity::Entity::find()
        .filter(activity::Column::Timestamp.gte(since))
        .filter(Condition::any().add(shared_creations).add(own_actions))
        .order_by_desc(activity::Column::Timestamp)
        .order_by_desc(activity::Column::Id)
        .limit(RECENT_LIMIT)
        .all(conn)
        .await?;

    Ok(rows.into_iter().map(ActivityItem::from).collect())
}

pub async fn notifications<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> AppResult<Vec<NotificationItem>> {
    let rows = notification::Entity::find()
        .filter(notification::Column::UserId.eq(user_id))
        .order_by_desc(notification::Column::CreatedAt)
        .order_by_desc(notification::Column::Id)
        .limit(NOTIFICATION_LIMIT)
        .all(conn)
        .await?;
    Ok(rows.into_iter().map(NotificationItem::from).collect())
}

pub async fn unread_count<C: ConnectionTrait>(conn: &C, user_id: i32) -> AppResult<u64> {
    let count = notification::Entity::find()
        .filter(notification::Column::UserId.eq(user_id))
        .filter(notification::Column::IsRead.eq(false))
        .count(conn)
        .await?;
    Ok(count)
}

/// Flip the read flag of one of the user's own notifications
pub async fn mark_read<C: ConnectionTrait>(conn: &C, user_id: i32, notification_id: i32) -> AppResult<()> {
    let row = notification::Entity::find_by_id(notification_id)
        .one(conn)
        .await?
        .ok_or_not_found("notification")?;
    if row.user_id != user_id {
        return Err(AppError::Forbidden);
    }
    if row.is_read {
        return Ok(());
    }
    let mut active: notification::ActiveModel = row.into();
    active.is_read = Set(true);
    active.update(conn).await?;
    Ok(())
}

pub async fn mark_all_read<C: ConnectionTrait>(conn: &C, user_id: i32) -> AppResult<u64> {
    let result = notification::Entity::update_many()
        .col_expr(notification::Column::IsRead, sea_orm::sea_query::Expr::value(true))
        .filter(notification::Column::UserId.eq(user_id))
        .filter(notification::Column::IsRead.eq(false))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}
