//! Portal operations
//!
//! `Drive` owns every collaborator an operation needs. Each mutating
//! operation runs in one database transaction; live pushes, mails and blob
//! removals are collected in an [`Outbox`] and only run after commit.

use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;

use crate::config::Config;
use crate::credential::PasswordHasher;
use crate::entity::notification::{self, NotificationItem};
use crate::entity::user::{self, Role};
use crate::entity::{file, folder};
use crate::error::{AppError, AppResult, OptionExt};
use crate::ledger;
use crate::mail::{self, Mail, MailDispatcher};
use crate::storage::BlobStore;
use crate::ws::{Hub, WsMessage};

pub mod export;
pub mod file_ops;
pub mod folder_ops;
pub mod search;
pub mod trash;
pub mod users;

pub use export::{ArchiveEntry, ExportStream};
pub use file_ops::{Download, FavoriteState, NewUpload};
pub use folder_ops::{FolderView, NewFolder, UserGrant};
pub use search::{SearchResults, UserStats};
pub use trash::{TrashListing, TrashSummary};
pub use users::{NewUser, Registration};

#[derive(Clone)]
pub struct Drive {
    db: DatabaseConnection,
    config: Arc<Config>,
    blobs: Arc<dyn BlobStore>,
    hub: Arc<Hub>,
    mailer: Arc<dyn MailDispatcher>,
    hasher: PasswordHasher,
}

/// Side effects that must wait for the transaction to commit
#[derive(Default)]
pub(crate) struct Outbox {
    notifications: Vec<notification::Model>,
    blobs: Vec<String>,
    mails: Vec<Mail>,
}

impl Outbox {
    /// Insert a notification in the transaction and queue its live push
    pub(crate) async fn notify<C: ConnectionTrait>(
        &mut self,
        conn: &C,
        user_id: i32,
        title: &str,
        message: &str,
        url: &str,
    ) -> AppResult<()> {
        let row = ledger::notify(conn, user_id, title, message, url).await?;
        self.notifications.push(row);
        Ok(())
    }

    pub(crate) fn remove_blob(&mut self, key: impl Into<String>) {
        self.blobs.push(key.into());
    }

    pub(crate) fn mail(&mut self, to: &str, subject: impl Into<String>, body: impl Into<String>) {
        self.mails.push(Mail {
            to: to.to_string(),
            subject: subject.into(),
            body: body.into(),
        });
    }
}

impl Drive {
    pub fn new(
        db: DatabaseConnection,
        config: Arc<Config>,
        blobs: Arc<dyn BlobStore>,
        hub: Arc<Hub>,
        mailer: Arc<dyn MailDispatcher>,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            db,
            config,
            blobs,
            hub,
            mailer,
            hasher,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Run the committed side effects of an operation.
    ///
    /// Blob removal failures are logged and swallowed.
    pub(crate) async fn flush(&self, outbox: Outbox) {
        for n in outbox.notifications {
            let user_id = n.user_id;
            self.hub
                .push(user_id, WsMessage::Notification(NotificationItem::from(n)));
        }

        for key in outbox.blobs {
            if let Err(e) = self.blobs.delete(&key).await {
                tracing::warn!("Failed to remove blob {}: {}", key, e);
            }
        }

        mail::dispatch(self.mailer.clone(), outbox.mails);
    }

    pub(crate) fn folder_url(&self, folder_id: i32) -> String {
        self.config.folder_url(folder_id)
    }
}

pub(crate) async fn find_folder<C: ConnectionTrait>(conn: &C, id: i32) -> AppResult<folder::Model> {
    folder::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_not_found(format!("folder {}", id))
}

/// A folder that is not in the trash
pub(crate) async fn find_active_folder<C: ConnectionTrait>(conn: &C, id: i32) -> AppResult<folder::Model> {
    let f = find_folder(conn, id).await?;
    if f.deleted {
        return Err(AppError::NotFound(format!("folder {}", id)));
    }
    Ok(f)
}

pub(crate) async fn find_file<C: ConnectionTrait>(conn: &C, id: i32) -> AppResult<file::Model> {
    file::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_not_found(format!("file {}", id))
}

pub(crate) async fn find_active_file<C: ConnectionTrait>(conn: &C, id: i32) -> AppResult<file::Model> {
    let f = find_file(conn, id).await?;
    if f.deleted {
        return Err(AppError::NotFound(format!("file {}", id)));
    }
    Ok(f)
}

pub(crate) async fn find_user<C: ConnectionTrait>(conn: &C, id: i32) -> AppResult<user::Model> {
    user::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_not_found(format!("user {}", id))
}

pub(crate) async fn super_admins<C: ConnectionTrait>(conn: &C) -> AppResult<Vec<user::Model>> {
    let admins = user::Entity::find()
        .filter(user::Column::Role.eq(Role::SuperAdmin.as_str()))
        .all(conn)
        .await?;
    Ok(admins)
}

/// Trimmed, non-empty, bounded display name
pub(crate) fn clean_name(raw: &str, max_chars: usize) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    if name.chars().count() > max_chars {
        return Err(AppError::Validation(format!(
            "name is longer than {} characters",
            max_chars
        )));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(AppError::Validation("name contains control characters".to_string()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("  Reports ", 150).unwrap(), "Reports");
        assert!(matches!(clean_name("   ", 150), Err(AppError::Validation(_))));
        assert!(matches!(clean_name("abcd", 3), Err(AppError::Validation(_))));
        assert!(matches!(clean_name("a\nb", 10), Err(AppError::Validation(_))));
    }
}
