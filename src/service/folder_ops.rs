//! Folder creation, listing, renaming and sharing

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::info;

use super::{clean_name, find_active_folder, super_admins, Drive, Outbox};
use crate::entity::activity::ActivityAction;
use crate::entity::file::{self, FileItem};
use crate::entity::folder::{self, FolderItem};
use crate::entity::{folder_permission, user};
use crate::error::AppResult;
use crate::ledger;
use crate::middleware::auth::CurrentUser;
use crate::permission::{self, Action, DbGrants, Grant, GrantChange};
use crate::tree::FolderTree;

pub const MAX_FOLDER_NAME: usize = 150;

/// One user's entry in a folder's grant set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGrant {
    #[serde(rename = "userId")]
    pub user_id: i32,
    #[serde(flatten)]
    pub grant: Grant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFolder {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "isPersonal")]
    pub is_personal: bool,
    #[serde(default, rename = "parentId")]
    pub parent_id: Option<i32>,
    #[serde(default)]
    pub grants: Vec<UserGrant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Crumb {
    pub id: i32,
    pub name: String,
}

/// An opened folder
#[derive(Debug, Clone, Serialize)]
pub struct FolderView {
    pub folder: FolderItem,
    /// Rights of the viewer on this folder
    pub rights: Grant,
    pub children: Vec<FolderItem>,
    pub files: Vec<FileItem>,
    pub breadcrumb: Vec<Crumb>,
}

pub(crate) fn grant_row(folder_id: i32, user_id: i32, grant: Grant) -> folder_permission::ActiveModel {
    folder_permission::ActiveModel {
        folder_id: Set(folder_id),
        user_id: Set(user_id),
        can_read: Set(grant.read),
        can_edit: Set(grant.edit),
        can_delete: Set(grant.delete),
        can_download: Set(grant.download),
        ..Default::default()
    }
}

async fn insert_grants<C: ConnectionTrait>(
    conn: &C,
    folder_id: i32,
    grants: impl IntoIterator<Item = (i32, Grant)>,
) -> AppResult<()> {
    let rows: Vec<_> = grants
        .into_iter()
        .map(|(user_id, grant)| grant_row(folder_id, user_id, grant))
        .collect();
    if rows.is_empty() {
        return Ok(());
    }
    folder_permission::Entity::insert_many(rows).exec(conn).await?;
    Ok(())
}

/// Users by id, for the subset that exists
async fn users_by_id<C: ConnectionTrait>(
    conn: &C,
    ids: impl IntoIterator<Item = i32>,
) -> AppResult<HashMap<i32, user::Model>> {
    let ids: Vec<i32> = ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let users = user::Entity::find()
        .filter(user::Column::Id.is_in(ids))
        .all(conn)
        .await?;
    Ok(users.into_iter().map(|u| (u.id, u)).collect())
}

/// Keep requested grants that target real, non-excluded users.
/// A later entry for the same user replaces an earlier one.
async fn sanitize_grants<C: ConnectionTrait>(
    conn: &C,
    requested: Vec<UserGrant>,
    excluded: &HashSet<i32>,
) -> AppResult<BTreeMap<i32, Grant>> {
    let mut wanted = BTreeMap::new();
    for g in requested {
        if excluded.contains(&g.user_id) {
            continue;
        }
        if g.grant.is_empty() {
            wanted.remove(&g.user_id);
            continue;
        }
        wanted.insert(g.user_id, g.grant);
    }

    let known = users_by_id(conn, wanted.keys().copied()).await?;
    wanted.retain(|user_id, _| {
        let exists = known.contains_key(user_id);
        if !exists {
            tracing::warn!("Ignoring grant for unknown user {}", user_id);
        }
        exists
    });
    Ok(wanted)
}

impl Drive {
    /// Create a root folder or a sub-folder.
    ///
    /// Sub-folders need `edit` on the parent. Every super admin receives a
    /// full grant row on the new folder; personal folders take no other
    /// grants.
    pub async fn create_folder(&self, actor: &CurrentUser, req: NewFolder) -> AppResult<folder::Model> {
        let name = clean_name(&req.name, MAX_FOLDER_NAME)?;
        let description = req
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let txn = self.db.begin().await?;

        let parent = match req.parent_id {
            Some(parent_id) => {
                let parent = find_active_folder(&txn, parent_id).await?;
                permission::require(&DbGrants(&txn), &parent, actor.id, Action::Edit).await?;
                Some(parent)
            }
            None => None,
        };
        let is_personal = parent.is_none() && req.is_personal;

        let created = folder::ActiveModel {
            name: Set(name),
            description: Set(description),
            owner_id: Set(actor.id),
            parent_id: Set(parent.as_ref().map(|p| p.id)),
            is_personal: Set(is_personal),
            deleted: Set(false),
            created_at: Set(ledger::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let admins = super_admins(&txn).await?;
        let admin_ids: HashSet<i32> = admins.iter().map(|a| a.id).collect();

        let granted = if is_personal {
            BTreeMap::new()
        } else {
            let mut excluded = admin_ids.clone();
            excluded.insert(actor.id);
            sanitize_grants(&txn, req.grants, &excluded).await?
        };
        insert_grants(&txn, created.id, granted.iter().map(|(u, g)| (*u, *g))).await?;
        insert_grants(&txn, created.id, admin_ids.iter().map(|u| (*u, Grant::FULL))).await?;

        ledger::log_activity(&txn, actor.id, ActivityAction::Created, None, Some(created.id)).await?;

        let mut outbox = Outbox::default();
        let url = self.folder_url(created.id);
        let mut recipients: BTreeSet<i32> = match &parent {
            None => granted.keys().chain(admin_ids.iter()).copied().collect(),
            Some(parent) => {
                let mut r: BTreeSet<i32> = permission::folder_grants(&txn, parent.id)
                    .await?
                    .into_keys()
                    .collect();
                r.insert(parent.owner_id);
                r
            }
        };
        recipients.remove(&actor.id);

        let (title, message) = match &parent {
            None => (
                "New folder",
                format!(
                    "{} created the folder \"{}\"{}",
                    actor.name,
                    created.name,
                    if is_personal { " (personal)" } else { "" }
                ),
            ),
            Some(parent) => (
                "New sub-folder",
                format!(
                    "{} created the sub-folder \"{}\" in \"{}\"",
                    actor.name, created.name, parent.name
                ),
            ),
        };
        for user_id in &recipients {
            outbox.notify(&txn, *user_id, title, &message, &url).await?;
        }
        if parent.is_none() {
            for u in users_by_id(&txn, recipients.iter().copied()).await?.values() {
                outbox.mail(&u.email, format!("{}: {}", title, created.name), format!("{}\n{}", message, url));
            }
        }

        txn.commit().await?;
        self.flush(outbox).await;

        info!(
            folder_id = created.id,
            owner_id = actor.id,
            parent_id = ?created.parent_id,
            "Folder created"
        );
        Ok(created)
    }

    /// Non-deleted children the viewer owns or can read, newest first.
    /// The folder itself must be readable.
    pub async fn list_children(&self, actor: &CurrentUser, folder_id: i32) -> AppResult<Vec<folder::Model>> {
        let parent = find_active_folder(&self.db, folder_id).await?;
        permission::require(&DbGrants(&self.db), &parent, actor.id, Action::Read).await?;
        self.accessible_children(actor.id, folder_id).await
    }

    async fn accessible_children(&self, user_id: i32, folder_id: i32) -> AppResult<Vec<folder::Model>> {
        let readable = permission::readable_folder_ids(&self.db, user_id).await?;
        let children = folder::Entity::find()
            .filter(folder::Column::ParentId.eq(folder_id))
            .filter(folder::Column::Deleted.eq(false))
            .order_by_desc(folder::Column::CreatedAt)
            .order_by_desc(folder::Column::Id)
            .all(&self.db)
            .await?;
        Ok(children
            .into_iter()
            .filter(|f| f.owner_id == user_id || readable.contains(&f.id))
            .collect())
    }

    /// Folder page: children, files and breadcrumb. Logs an `opened` event.
    pub async fn open_folder(&self, actor: &CurrentUser, folder_id: i32) -> AppResult<FolderView> {
        let f = find_active_folder(&self.db, folder_id).await?;
        let store = DbGrants(&self.db);
        permission::require(&store, &f, actor.id, Action::Read).await?;

        let rights = if f.owner_id == actor.id {
            Grant::FULL
        } else {
            permission::PermissionStore::get(&store, f.id, actor.id)
                .await?
                .unwrap_or_default()
        };

        let children = self.accessible_children(actor.id, folder_id).await?;
        let files = file::Entity::find()
            .filter(file::Column::FolderId.eq(folder_id))
            .filter(file::Column::Deleted.eq(false))
            .order_by_desc(file::Column::UploadedAt)
            .order_by_desc(file::Column::Id)
            .all(&self.db)
            .await?;

        let tree = FolderTree::load_ancestors(&self.db, [folder_id]).await?;
        let breadcrumb = tree
            .breadcrumb(folder_id)
            .into_iter()
            .map(|c| Crumb {
                id: c.id,
                name: c.name.clone(),
            })
            .collect();

        ledger::log_activity(&self.db, actor.id, ActivityAction::Opened, None, Some(folder_id)).await?;

        Ok(FolderView {
            folder: f.into(),
            rights,
            children: children.into_iter().map(FolderItem::from).collect(),
            files: files.into_iter().map(FileItem::from).collect(),
            breadcrumb,
        })
    }

    /// Root folders owned by the user
    pub async fn home_folders(&self, actor: &CurrentUser) -> AppResult<Vec<folder::Model>> {
        let folders = folder::Entity::find()
            .filter(folder::Column::OwnerId.eq(actor.id))
            .filter(folder::Column::ParentId.is_null())
            .filter(folder::Column::Deleted.eq(false))
            .order_by_desc(folder::Column::CreatedAt)
            .order_by_desc(folder::Column::Id)
            .all(&self.db)
            .await?;
        Ok(folders)
    }

    /// Root folders the user owns or can read
    pub async fn explore_folders(&self, actor: &CurrentUser) -> AppResult<Vec<folder::Model>> {
        let readable: Vec<i32> = permission::readable_folder_ids(&self.db, actor.id)
            .await?
            .into_iter()
            .collect();
        let folders = folder::Entity::find()
            .filter(folder::Column::ParentId.is_null())
            .filter(folder::Column::Deleted.eq(false))
            .filter(
                Condition::any()
                    .add(folder::Column::OwnerId.eq(actor.id))
                    .add(folder::Column::Id.is_in(readable)),
            )
            .order_by_desc(folder::Column::CreatedAt)
            .order_by_desc(folder::Column::Id)
            .all(&self.db)
            .await?;
        Ok(folders)
    }

    pub async fn rename_folder(&self, actor: &CurrentUser, folder_id: i32, new_name: &str) -> AppResult<folder::Model> {
        let name = clean_name(new_name, MAX_FOLDER_NAME)?;

        let txn = self.db.begin().await?;
        let f = find_active_folder(&txn, folder_id).await?;
        permission::require(&DbGrants(&txn), &f, actor.id, Action::Edit).await?;
        if f.name == name {
            return Ok(f);
        }

        let old_name = f.name.clone();
        let mut active: folder::ActiveModel = f.into();
        active.name = Set(name);
        let updated = active.update(&txn).await?;
        ledger::log_activity(&txn, actor.id, ActivityAction::Renamed, None, Some(folder_id)).await?;
        txn.commit().await?;

        info!(folder_id, "Folder renamed: {} -> {}", old_name, updated.name);
        Ok(updated)
    }

    /// Current grant rows of a folder, for its owner or an editor
    pub async fn folder_permissions(&self, actor: &CurrentUser, folder_id: i32) -> AppResult<Vec<UserGrant>> {
        let f = find_active_folder(&self.db, folder_id).await?;
        permission::require(&DbGrants(&self.db), &f, actor.id, Action::Edit).await?;

        let mut grants: Vec<UserGrant> = permission::folder_grants(&self.db, folder_id)
            .await?
            .into_iter()
            .map(|(user_id, grant)| UserGrant { user_id, grant })
            .collect();
        grants.sort_by_key(|g| g.user_id);
        Ok(grants)
    }

    /// Replace a folder's grant set.
    ///
    /// `grants` is the complete desired set for everyone except the owner
    /// and the acting user; super admin rows are left as they are. Each
    /// user whose rights changed receives one notification. Returns the
    /// number of users notified.
    pub async fn update_permissions(
        &self,
        actor: &CurrentUser,
        folder_id: i32,
        grants: Vec<UserGrant>,
    ) -> AppResult<usize> {
        let txn = self.db.begin().await?;
        let f = find_active_folder(&txn, folder_id).await?;
        if f.owner_id != actor.id {
            permission::require(&DbGrants(&txn), &f, actor.id, Action::Edit).await?;
        }

        let before = permission::folder_grants(&txn, folder_id).await?;

        let mut protected: HashSet<i32> = super_admins(&txn).await?.into_iter().map(|a| a.id).collect();
        protected.insert(f.owner_id);
        protected.insert(actor.id);

        let wanted = sanitize_grants(&txn, grants, &protected).await?;

        folder_permission::Entity::delete_many()
            .filter(folder_permission::Column::FolderId.eq(folder_id))
            .filter(folder_permission::Column::UserId.is_not_in(protected.iter().copied()))
            .exec(&txn)
            .await?;
        insert_grants(&txn, folder_id, wanted.into_iter()).await?;

        let after = permission::folder_grants(&txn, folder_id).await?;
        let delta = permission::grant_delta(&before, &after, &[f.owner_id, actor.id]);

        let mut outbox = Outbox::default();
        let url = self.folder_url(folder_id);
        let recipients = users_by_id(&txn, delta.keys().copied()).await?;
        for (user_id, change) in &delta {
            let title = match change {
                GrantChange::Added(_) => "New access",
                GrantChange::Removed(_) => "Access removed",
                GrantChange::Changed { .. } => "Permissions updated",
            };
            let message = format!(
                "{} changed your rights on \"{}\": {}",
                actor.name,
                f.name,
                change.summary()
            );
            outbox.notify(&txn, *user_id, title, &message, &url).await?;
            if let Some(u) = recipients.get(user_id) {
                outbox.mail(&u.email, format!("{}: {}", title, f.name), format!("{}\n{}", message, url));
            }
        }

        txn.commit().await?;
        self.flush(outbox).await;

        info!(folder_id, changed = delta.len(), "Folder permissions updated");
        Ok(delta.len())
    }
}
