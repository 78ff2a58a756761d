//! Upload, download, rename and favorites

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, warn};

use super::{find_active_file, find_active_folder, find_folder, Drive, Outbox};
use crate::entity::activity::ActivityAction;
use crate::entity::{favorite, file, folder};
use crate::error::{AppError, AppResult};
use crate::ledger;
use crate::middleware::auth::CurrentUser;
use crate::permission::{self, Action, DbGrants};
use crate::storage::{is_safe_filename, BlobStream};

const MAX_FILE_NAME: usize = 255;
const DEFAULT_MIME: &str = "application/octet-stream";

/// A file received from a client
pub struct NewUpload {
    pub folder_id: i32,
    pub original_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A readable blob with its row
pub struct Download {
    pub file: file::Model,
    pub stream: BlobStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteState {
    Added,
    Removed,
}

fn clean_file_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if !is_safe_filename(name) {
        return Err(AppError::Validation(format!("invalid file name: {:?}", raw)));
    }
    if name.chars().count() > MAX_FILE_NAME {
        return Err(AppError::Validation("file name is too long".to_string()));
    }
    Ok(name.to_string())
}

/// Opaque, collision resistant blob key keeping the original extension
fn stored_name_for(original_name: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    match original_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!("{}.{}", id, ext.to_lowercase()),
        _ => id,
    }
}

/// Files follow the decision of their folder; a folderless file is its owner's alone
pub(crate) async fn require_on_file<C>(
    conn: &C,
    f: &file::Model,
    user_id: i32,
    action: Action,
) -> AppResult<()>
where
    C: ConnectionTrait + Sync,
{
    match f.folder_id {
        Some(folder_id) => {
            let parent = find_folder(conn, folder_id).await?;
            permission::require(&DbGrants(conn), &parent, user_id, action).await
        }
        None if f.owner_id == user_id => Ok(()),
        None => Err(AppError::Forbidden),
    }
}

impl Drive {
    /// Store a new file in a folder the user can edit.
    ///
    /// The blob is written before the row; if the row cannot be recorded
    /// the blob is removed again.
    pub async fn upload_file(&self, actor: &CurrentUser, upload: NewUpload) -> AppResult<file::Model> {
        let original_name = clean_file_name(&upload.original_name)?;
        if !self.config.is_allowed_extension(&original_name) {
            return Err(AppError::Validation(format!(
                "file type not allowed: {}",
                original_name
            )));
        }
        if upload.bytes.len() > self.config.max_upload_size {
            return Err(AppError::PayloadTooLarge(format!(
                "{} bytes exceeds the {} byte limit",
                upload.bytes.len(),
                self.config.max_upload_size
            )));
        }

        let target = find_active_folder(&self.db, upload.folder_id).await?;
        permission::require(&DbGrants(&self.db), &target, actor.id, Action::Edit).await?;

        let stored_name = stored_name_for(&original_name);
        self.blobs.save(&stored_name, &upload.bytes).await?;

        let mime_type = upload
            .mime_type
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MIME.to_string());
        let size = upload.bytes.len() as i64;

        match self
            .record_upload(actor, &target, &stored_name, original_name, mime_type, size)
            .await
        {
            Ok(created) => {
                info!(file_id = created.id, folder_id = target.id, size, "File uploaded");
                Ok(created)
            }
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&stored_name).await {
                    warn!("Failed to remove blob {} after failed upload: {}", stored_name, cleanup);
                }
                Err(e)
            }
        }
    }

    async fn record_upload(
        &self,
        actor: &CurrentUser,
        target: &folder::Model,
        stored_name: &str,
        original_name: String,
        mime_type: String,
        size: i64,
    ) -> AppResult<file::Model> {
        let txn = self.db.begin().await?;

        let created = file::ActiveModel {
            title: Set(original_name.clone()),
            stored_name: Set(stored_name.to_string()),
            original_name: Set(original_name),
            mime_type: Set(mime_type.chars().take(100).collect()),
            size: Set(size),
            folder_id: Set(Some(target.id)),
            owner_id: Set(actor.id),
            visibility: Set("service".to_string()),
            deleted: Set(false),
            uploaded_at: Set(ledger::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        ledger::log_activity(&txn, actor.id, ActivityAction::Uploaded, Some(created.id), Some(target.id)).await?;

        let mut outbox = Outbox::default();
        let url = self.folder_url(target.id);
        let message = format!("{} added: {}", actor.name, created.original_name);
        let mut holders: Vec<i32> = permission::folder_grants(&txn, target.id)
            .await?
            .into_keys()
            .filter(|u| *u != actor.id)
            .collect();
        holders.sort_unstable();
        for user_id in holders {
            outbox.notify(&txn, user_id, "New file", &message, &url).await?;
        }

        txn.commit().await?;
        self.flush(outbox).await;
        Ok(created)
    }

    /// Open a file for reading; needs `read` on its folder. Logs a download.
    pub async fn download_file(&self, actor: &CurrentUser, file_id: i32) -> AppResult<Download> {
        let f = find_active_file(&self.db, file_id).await?;
        require_on_file(&self.db, &f, actor.id, Action::Read).await?;

        let stream = self.blobs.stream(&f.stored_name).await?;
        ledger::log_activity(&self.db, actor.id, ActivityAction::Downloaded, Some(f.id), f.folder_id).await?;

        Ok(Download { file: f, stream })
    }

    /// Rename a file; needs `edit` on its folder
    pub async fn rename_file(&self, actor: &CurrentUser, file_id: i32, new_name: &str) -> AppResult<file::Model> {
        let name = clean_file_name(new_name)?;

        let txn = self.db.begin().await?;
        let f = find_active_file(&txn, file_id).await?;
        require_on_file(&txn, &f, actor.id, Action::Edit).await?;
        if f.original_name == name && f.title == name {
            return Ok(f);
        }

        let mut active: file::ActiveModel = f.into();
        active.title = Set(name.clone());
        active.original_name = Set(name);
        let updated = active.update(&txn).await?;
        ledger::log_activity(&txn, actor.id, ActivityAction::Renamed, Some(file_id), updated.folder_id).await?;
        txn.commit().await?;

        Ok(updated)
    }

    pub async fn toggle_favorite(&self, actor: &CurrentUser, file_id: i32) -> AppResult<FavoriteState> {
        let f = find_active_file(&self.db, file_id).await?;
        require_on_file(&self.db, &f, actor.id, Action::Read).await?;

        let existing = favorite::Entity::find()
            .filter(favorite::Column::UserId.eq(actor.id))
            .filter(favorite::Column::FileId.eq(file_id))
            .one(&self.db)
            .await?;

        match existing {
            Some(fav) => {
                fav.delete(&self.db).await?;
                Ok(FavoriteState::Removed)
            }
            None => {
                favorite::ActiveModel {
                    user_id: Set(actor.id),
                    file_id: Set(file_id),
                    created_at: Set(ledger::now()),
                    ..Default::default()
                }
                .insert(&self.db)
                .await?;
                Ok(FavoriteState::Added)
            }
        }
    }

    /// Favorite files that are not in the trash
    pub async fn list_favorites(&self, actor: &CurrentUser) -> AppResult<Vec<file::Model>> {
        let favs = favorite::Entity::find()
            .filter(favorite::Column::UserId.eq(actor.id))
            .all(&self.db)
            .await?;
        if favs.is_empty() {
            return Ok(Vec::new());
        }

        let files = file::Entity::find()
            .filter(file::Column::Id.is_in(favs.iter().map(|f| f.file_id)))
            .filter(file::Column::Deleted.eq(false))
            .order_by_desc(file::Column::UploadedAt)
            .order_by_desc(file::Column::Id)
            .all(&self.db)
            .await?;
        Ok(files)
    }
}
