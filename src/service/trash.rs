//! Soft delete, restore and purge
//!
//! Deleting a folder marks its whole subtree in one transaction. Restoring
//! flips only the named node, so a restored child of a trashed parent stays
//! active but unreachable until the parent is restored too. Purging removes
//! rows inside the transaction and blobs after it commits.

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

use super::file_ops::require_on_file;
use super::{find_active_file, find_active_folder, find_file, find_folder, Drive, Outbox};
use crate::entity::activity::ActivityAction;
use crate::entity::file::{self, FileItem};
use crate::entity::folder::{self, FolderItem};
use crate::entity::{favorite, folder_permission};
use crate::error::{AppError, AppResult};
use crate::ledger;
use crate::middleware::auth::CurrentUser;
use crate::permission::{self, Action, DbGrants};
use crate::tree::FolderTree;

/// Trashed items owned by a user
#[derive(Debug, Clone, Serialize)]
pub struct TrashListing {
    pub folders: Vec<FolderItem>,
    pub files: Vec<FileItem>,
}

/// Rows removed by a purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrashSummary {
    pub folders: u64,
    pub files: u64,
}

/// Delete the given files with their favorites and queue their blobs
async fn purge_files<C: ConnectionTrait>(
    conn: &C,
    files: Vec<file::Model>,
    outbox: &mut Outbox,
) -> AppResult<u64> {
    if files.is_empty() {
        return Ok(0);
    }
    let ids: Vec<i32> = files.iter().map(|f| f.id).collect();

    favorite::Entity::delete_many()
        .filter(favorite::Column::FileId.is_in(ids.clone()))
        .exec(conn)
        .await?;
    let removed = file::Entity::delete_many()
        .filter(file::Column::Id.is_in(ids))
        .exec(conn)
        .await?
        .rows_affected;

    for f in files {
        outbox.remove_blob(f.stored_name);
    }
    Ok(removed)
}

/// Delete a set of folders, everything filed in them and their grants
async fn purge_folders<C: ConnectionTrait>(
    conn: &C,
    folder_ids: Vec<i32>,
    outbox: &mut Outbox,
) -> AppResult<TrashSummary> {
    if folder_ids.is_empty() {
        return Ok(TrashSummary::default());
    }

    let contained = file::Entity::find()
        .filter(file::Column::FolderId.is_in(folder_ids.clone()))
        .all(conn)
        .await?;
    let files = purge_files(conn, contained, outbox).await?;

    folder_permission::Entity::delete_many()
        .filter(folder_permission::Column::FolderId.is_in(folder_ids.clone()))
        .exec(conn)
        .await?;
    let folders = folder::Entity::delete_many()
        .filter(folder::Column::Id.is_in(folder_ids))
        .exec(conn)
        .await?
        .rows_affected;

    Ok(TrashSummary { folders, files })
}

fn require_owner(owner_id: i32, actor: &CurrentUser) -> AppResult<()> {
    if owner_id == actor.id {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn not_in_trash(what: &str) -> AppError {
    AppError::Validation(format!("{} is not in the trash", what))
}

impl Drive {
    /// Move a folder and its whole subtree to the trash; needs `delete`
    pub async fn soft_delete_folder(&self, actor: &CurrentUser, folder_id: i32) -> AppResult<()> {
        let txn = self.db.begin().await?;
        let target = find_active_folder(&txn, folder_id).await?;
        permission::require(&DbGrants(&txn), &target, actor.id, Action::Delete).await?;

        let tree = FolderTree::load(&txn).await?;
        let ids = tree.subtree_ids(target.id);

        folder::Entity::update_many()
            .col_expr(folder::Column::Deleted, Expr::value(true))
            .filter(folder::Column::Id.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        let files = file::Entity::update_many()
            .col_expr(file::Column::Deleted, Expr::value(true))
            .filter(file::Column::FolderId.is_in(ids.clone()))
            .exec(&txn)
            .await?
            .rows_affected;

        ledger::log_activity(&txn, actor.id, ActivityAction::Deleted, None, Some(target.id)).await?;
        txn.commit().await?;

        info!(folder_id, folders = ids.len(), files, "Folder moved to trash");
        Ok(())
    }

    /// Move one file to the trash; needs `delete` on its folder
    pub async fn soft_delete_file(&self, actor: &CurrentUser, file_id: i32) -> AppResult<()> {
        let txn = self.db.begin().await?;
        let f = find_active_file(&txn, file_id).await?;
        require_on_file(&txn, &f, actor.id, Action::Delete).await?;

        let folder_id = f.folder_id;
        let mut active: file::ActiveModel = f.into();
        active.deleted = Set(true);
        active.update(&txn).await?;

        ledger::log_activity(&txn, actor.id, ActivityAction::Deleted, Some(file_id), folder_id).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Owner only. Descendants stay in the trash.
    pub async fn restore_folder(&self, actor: &CurrentUser, folder_id: i32) -> AppResult<folder::Model> {
        let txn = self.db.begin().await?;
        let target = find_folder(&txn, folder_id).await?;
        require_owner(target.owner_id, actor)?;
        if !target.deleted {
            return Err(not_in_trash("folder"));
        }

        let mut active: folder::ActiveModel = target.into();
        active.deleted = Set(false);
        let restored = active.update(&txn).await?;

        ledger::log_activity(&txn, actor.id, ActivityAction::Restored, None, Some(folder_id)).await?;
        txn.commit().await?;
        Ok(restored)
    }

    pub async fn restore_file(&self, actor: &CurrentUser, file_id: i32) -> AppResult<file::Model> {
        let txn = self.db.begin().await?;
        let f = find_file(&txn, file_id).await?;
        require_owner(f.owner_id, actor)?;
        if !f.deleted {
            return Err(not_in_trash("file"));
        }

        let mut active: file::ActiveModel = f.into();
        active.deleted = Set(false);
        let restored = active.update(&txn).await?;

        ledger::log_activity(&txn, actor.id, ActivityAction::Restored, Some(file_id), restored.folder_id)
            .await?;
        txn.commit().await?;
        Ok(restored)
    }

    /// Permanently remove a trashed folder and its subtree. Owner only.
    pub async fn purge_folder(&self, actor: &CurrentUser, folder_id: i32) -> AppResult<TrashSummary> {
        let mut outbox = Outbox::default();

        let txn = self.db.begin().await?;
        let target = find_folder(&txn, folder_id).await?;
        require_owner(target.owner_id, actor)?;
        if !target.deleted {
            return Err(not_in_trash("folder"));
        }

        let tree = FolderTree::load(&txn).await?;
        let summary = purge_folders(&txn, tree.subtree_ids(target.id), &mut outbox).await?;
        txn.commit().await?;

        self.flush(outbox).await;
        info!(folder_id, folders = summary.folders, files = summary.files, "Folder purged");
        Ok(summary)
    }

    /// Permanently remove a trashed file. Owner or super admin.
    pub async fn purge_file(&self, actor: &CurrentUser, file_id: i32) -> AppResult<()> {
        let mut outbox = Outbox::default();

        let txn = self.db.begin().await?;
        let f = find_file(&txn, file_id).await?;
        if f.owner_id != actor.id && !actor.is_super_admin() {
            return Err(AppError::Forbidden);
        }
        if !f.deleted {
            return Err(not_in_trash("file"));
        }
        purge_files(&txn, vec![f], &mut outbox).await?;
        txn.commit().await?;

        self.flush(outbox).await;
        Ok(())
    }

    /// Purge everything the user has in the trash.
    ///
    /// Loose files go first, then the subtrees of trashed folders. A
    /// sub-folder restored on its own under a still-trashed parent is part
    /// of that subtree and goes too, like a restored file whose folder stays
    /// trashed. A second run finds nothing and returns zero counts.
    pub async fn empty_trash(&self, actor: &CurrentUser) -> AppResult<TrashSummary> {
        let mut outbox = Outbox::default();
        let txn = self.db.begin().await?;

        let trashed_files = file::Entity::find()
            .filter(file::Column::OwnerId.eq(actor.id))
            .filter(file::Column::Deleted.eq(true))
            .all(&txn)
            .await?;
        let loose = purge_files(&txn, trashed_files, &mut outbox).await?;

        let trashed_folders = folder::Entity::find()
            .filter(folder::Column::OwnerId.eq(actor.id))
            .filter(folder::Column::Deleted.eq(true))
            .all(&txn)
            .await?;
        let mut summary = if trashed_folders.is_empty() {
            TrashSummary::default()
        } else {
            let tree = FolderTree::load(&txn).await?;
            let ids: BTreeSet<i32> = trashed_folders
                .iter()
                .flat_map(|f| tree.subtree_ids(f.id))
                .collect();
            purge_folders(&txn, ids.into_iter().collect(), &mut outbox).await?
        };
        summary.files += loose;

        txn.commit().await?;
        self.flush(outbox).await;

        info!(
            user_id = actor.id,
            folders = summary.folders,
            files = summary.files,
            "Trash emptied"
        );
        Ok(summary)
    }

    pub async fn list_trash(&self, actor: &CurrentUser) -> AppResult<TrashListing> {
        let folders = folder::Entity::find()
            .filter(folder::Column::OwnerId.eq(actor.id))
            .filter(folder::Column::Deleted.eq(true))
            .order_by_desc(folder::Column::CreatedAt)
            .order_by_desc(folder::Column::Id)
            .all(&self.db)
            .await?;
        let files = file::Entity::find()
            .filter(file::Column::OwnerId.eq(actor.id))
            .filter(file::Column::Deleted.eq(true))
            .order_by_desc(file::Column::UploadedAt)
            .order_by_desc(file::Column::Id)
            .all(&self.db)
            .await?;

        Ok(TrashListing {
            folders: folders.into_iter().map(FolderItem::from).collect(),
            files: files.into_iter().map(FileItem::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::user::Role;
    use crate::permission::Grant;
    use crate::service::{NewFolder, NewUpload, UserGrant};
    use crate::storage::BlobStore;
    use crate::test_support::{fixture, Fixture};
    use sea_orm::PaginatorTrait;

    async fn mkdir(fx: &Fixture, owner: &CurrentUser, name: &str, parent_id: Option<i32>) -> folder::Model {
        fx.drive
            .create_folder(
                owner,
                NewFolder {
                    name: name.to_string(),
                    description: None,
                    is_personal: false,
                    parent_id,
                    grants: Vec::new(),
                },
            )
            .await
            .unwrap()
    }

    async fn put(fx: &Fixture, owner: &CurrentUser, folder_id: i32, name: &str) -> file::Model {
        fx.drive
            .upload_file(
                owner,
                NewUpload {
                    folder_id,
                    original_name: name.to_string(),
                    mime_type: None,
                    bytes: name.as_bytes().to_vec(),
                },
            )
            .await
            .unwrap()
    }

    async fn reload_folder(fx: &Fixture, id: i32) -> folder::Model {
        folder::Entity::find_by_id(id).one(fx.db()).await.unwrap().unwrap()
    }

    async fn reload_file(fx: &Fixture, id: i32) -> file::Model {
        file::Entity::find_by_id(id).one(fx.db()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_soft_delete_cascades_to_subtree_only() {
        let fx = fixture().await;
        let alice = CurrentUser::from(&fx.user("alice", Role::User).await);
        let root = mkdir(&fx, &alice, "A", None).await;
        let b = mkdir(&fx, &alice, "B", Some(root.id)).await;
        let c = mkdir(&fx, &alice, "C", Some(root.id)).await;
        let d = mkdir(&fx, &alice, "D", Some(b.id)).await;
        let in_b = put(&fx, &alice, b.id, "b.txt").await;
        let in_d = put(&fx, &alice, d.id, "d.txt").await;
        let in_c = put(&fx, &alice, c.id, "c.txt").await;

        fx.drive.soft_delete_folder(&alice, b.id).await.unwrap();

        assert!(reload_folder(&fx, b.id).await.deleted);
        assert!(reload_folder(&fx, d.id).await.deleted);
        assert!(reload_file(&fx, in_b.id).await.deleted);
        assert!(reload_file(&fx, in_d.id).await.deleted);

        assert!(!reload_folder(&fx, root.id).await.deleted);
        assert!(!reload_folder(&fx, c.id).await.deleted);
        assert!(!reload_file(&fx, in_c.id).await.deleted);
    }

    #[tokio::test]
    async fn test_soft_delete_needs_delete_grant() {
        let fx = fixture().await;
        let alice = CurrentUser::from(&fx.user("alice", Role::User).await);
        let bob = CurrentUser::from(&fx.user("bob", Role::User).await);
        let root = mkdir(&fx, &alice, "A", None).await;
        let edit = Grant { read: true, edit: true, ..Grant::default() };
        fx.drive
            .update_permissions(&alice, root.id, vec![UserGrant { user_id: bob.id, grant: edit }])
            .await
            .unwrap();
        let f = put(&fx, &alice, root.id, "a.txt").await;

        assert!(matches!(fx.drive.soft_delete_folder(&bob, root.id).await, Err(AppError::Forbidden)));
        assert!(matches!(fx.drive.soft_delete_file(&bob, f.id).await, Err(AppError::Forbidden)));

        fx.drive.soft_delete_file(&alice, f.id).await.unwrap();
        assert!(reload_file(&fx, f.id).await.deleted);
        assert!(matches!(fx.drive.soft_delete_file(&alice, f.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_restored_file_under_trashed_parent_is_not_listed() {
        let fx = fixture().await;
        let alice = CurrentUser::from(&fx.user("alice", Role::User).await);
        let root = mkdir(&fx, &alice, "A", None).await;
        let b = mkdir(&fx, &alice, "B", Some(root.id)).await;
        let f = put(&fx, &alice, b.id, "b.txt").await;

        fx.drive.soft_delete_folder(&alice, b.id).await.unwrap();
        let restored = fx.drive.restore_file(&alice, f.id).await.unwrap();
        assert!(!restored.deleted);

        // the parent is still trashed, so nothing lists the file
        assert!(matches!(fx.drive.open_folder(&alice, b.id).await, Err(AppError::NotFound(_))));
        let root_view = fx.drive.open_folder(&alice, root.id).await.unwrap();
        assert!(root_view.children.is_empty());
        let trash = fx.drive.list_trash(&alice).await.unwrap();
        assert_eq!(trash.folders.len(), 1);
        assert!(trash.files.is_empty());

        assert!(matches!(fx.drive.restore_file(&alice, f.id).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_restore_is_owner_only() {
        let fx = fixture().await;
        let alice = CurrentUser::from(&fx.user("alice", Role::User).await);
        let admin = CurrentUser::from(&fx.user("root", Role::SuperAdmin).await);
        let root = mkdir(&fx, &alice, "A", None).await;

        fx.drive.soft_delete_folder(&alice, root.id).await.unwrap();
        assert!(matches!(fx.drive.restore_folder(&admin, root.id).await, Err(AppError::Forbidden)));
        assert!(!fx.drive.restore_folder(&alice, root.id).await.unwrap().deleted);
    }

    #[tokio::test]
    async fn test_purge_folder_leaves_no_rows_or_blobs() {
        let fx = fixture().await;
        let alice = CurrentUser::from(&fx.user("alice", Role::User).await);
        let bob = CurrentUser::from(&fx.user("bob", Role::User).await);
        let root = mkdir(&fx, &alice, "A", None).await;
        let b = mkdir(&fx, &alice, "B", Some(root.id)).await;
        let read = Grant { read: true, ..Grant::default() };
        fx.drive
            .update_permissions(&alice, b.id, vec![UserGrant { user_id: bob.id, grant: read }])
            .await
            .unwrap();
        let f = put(&fx, &alice, b.id, "b.txt").await;
        fx.drive.toggle_favorite(&bob, f.id).await.unwrap();

        assert!(matches!(fx.drive.purge_folder(&alice, root.id).await, Err(AppError::Validation(_))));

        fx.drive.soft_delete_folder(&alice, root.id).await.unwrap();
        assert!(matches!(fx.drive.purge_folder(&bob, root.id).await, Err(AppError::Forbidden)));

        let summary = fx.drive.purge_folder(&alice, root.id).await.unwrap();
        assert_eq!(summary, TrashSummary { folders: 2, files: 1 });

        assert_eq!(folder::Entity::find().count(fx.db()).await.unwrap(), 0);
        assert_eq!(file::Entity::find().count(fx.db()).await.unwrap(), 0);
        assert_eq!(favorite::Entity::find().count(fx.db()).await.unwrap(), 0);
        assert_eq!(folder_permission::Entity::find().count(fx.db()).await.unwrap(), 0);
        assert!(!fx.blobs.exists(&f.stored_name).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_survives_blob_delete_failure() {
        let fx = fixture().await;
        let alice = CurrentUser::from(&fx.user("alice", Role::User).await);
        let root = mkdir(&fx, &alice, "A", None).await;
        let f = put(&fx, &alice, root.id, "a.txt").await;
        fx.drive.soft_delete_folder(&alice, root.id).await.unwrap();

        fx.faults.fail_deletes(true);
        let summary = fx.drive.purge_folder(&alice, root.id).await.unwrap();
        assert_eq!(summary, TrashSummary { folders: 1, files: 1 });

        assert_eq!(folder::Entity::find().count(fx.db()).await.unwrap(), 0);
        assert_eq!(file::Entity::find().count(fx.db()).await.unwrap(), 0);
        // the blob is left behind, nothing else
        assert!(fx.blobs.exists(&f.stored_name).await.unwrap());
        assert_eq!(fx.drive.empty_trash(&alice).await.unwrap(), TrashSummary::default());
    }

    #[tokio::test]
    async fn test_empty_trash_takes_restored_descendants() {
        let fx = fixture().await;
        let alice = CurrentUser::from(&fx.user("alice", Role::User).await);
        let root = mkdir(&fx, &alice, "A", None).await;
        let b = mkdir(&fx, &alice, "B", Some(root.id)).await;
        fx.drive.soft_delete_folder(&alice, root.id).await.unwrap();
        fx.drive.restore_folder(&alice, b.id).await.unwrap();
        assert!(!reload_folder(&fx, b.id).await.deleted);

        let summary = fx.drive.empty_trash(&alice).await.unwrap();
        assert_eq!(summary, TrashSummary { folders: 2, files: 0 });
        assert!(folder::Entity::find_by_id(b.id).one(fx.db()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_file_owner_or_super_admin() {
        let fx = fixture().await;
        let alice = CurrentUser::from(&fx.user("alice", Role::User).await);
        let bob = CurrentUser::from(&fx.user("bob", Role::User).await);
        let admin = CurrentUser::from(&fx.user("root", Role::SuperAdmin).await);
        let root = mkdir(&fx, &alice, "A", None).await;
        let f = put(&fx, &alice, root.id, "a.txt").await;

        assert!(matches!(fx.drive.purge_file(&alice, f.id).await, Err(AppError::Validation(_))));
        fx.drive.soft_delete_file(&alice, f.id).await.unwrap();
        assert!(matches!(fx.drive.purge_file(&bob, f.id).await, Err(AppError::Forbidden)));

        fx.drive.purge_file(&admin, f.id).await.unwrap();
        assert!(file::Entity::find_by_id(f.id).one(fx.db()).await.unwrap().is_none());
        assert!(!fx.blobs.exists(&f.stored_name).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_trash_twice() {
        let fx = fixture().await;
        let alice = CurrentUser::from(&fx.user("alice", Role::User).await);
        let root = mkdir(&fx, &alice, "A", None).await;
        let b = mkdir(&fx, &alice, "B", Some(root.id)).await;
        let loose = put(&fx, &alice, root.id, "loose.txt").await;
        put(&fx, &alice, b.id, "inner.txt").await;
        put(&fx, &alice, root.id, "kept.txt").await;

        fx.drive.soft_delete_file(&alice, loose.id).await.unwrap();
        fx.drive.soft_delete_folder(&alice, b.id).await.unwrap();

        let first = fx.drive.empty_trash(&alice).await.unwrap();
        assert_eq!(first, TrashSummary { folders: 1, files: 2 });
        let second = fx.drive.empty_trash(&alice).await.unwrap();
        assert_eq!(second, TrashSummary::default());

        assert_eq!(folder::Entity::find().count(fx.db()).await.unwrap(), 1);
        assert_eq!(file::Entity::find().count(fx.db()).await.unwrap(), 1);
    }
}
