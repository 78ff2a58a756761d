//! Folder permission resolver
//!
//! Flat per-folder ACL: the owner holds every right, everyone else holds
//! exactly what their (folder, user) grant row says. Nothing is inherited
//! from parent folders.

use async_trait::async_trait;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::entity::{folder, folder_permission};
use crate::error::{AppError, AppResult};

/// Folder action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Edit,
    Delete,
    Download,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Read, Action::Edit, Action::Delete, Action::Download];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Download => "download",
        }
    }
}

/// The four capability bits of one grant row
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub edit: bool,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub download: bool,
}

impl Grant {
    pub const FULL: Grant = Grant {
        read: true,
        edit: true,
        delete: true,
        download: true,
    };

    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Read => self.read,
            Action::Edit => self.edit,
            Action::Delete => self.delete,
            Action::Download => self.download,
        }
    }

    /// A grant with no bit set is equivalent to no row at all
    pub fn is_empty(&self) -> bool {
        !(self.read || self.edit || self.delete || self.download)
    }

    /// Actions set in this grant, in canonical order
    pub fn actions(&self) -> Vec<Action> {
        Action::ALL.into_iter().filter(|a| self.allows(*a)).collect()
    }
}

impl From<&folder_permission::Model> for Grant {
    fn from(row: &folder_permission::Model) -> Self {
        Self {
            read: row.can_read,
            edit: row.can_edit,
            delete: row.can_delete,
            download: row.can_download,
        }
    }
}

/// Source of grant rows
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn get(&self, folder_id: i32, user_id: i32) -> AppResult<Option<Grant>>;
}

/// Grant lookups against any sea-orm connection or open transaction
pub struct DbGrants<'a, C>(pub &'a C);

#[async_trait]
impl<'a, C> PermissionStore for DbGrants<'a, C>
where
    C: ConnectionTrait + Sync,
{
    async fn get(&self, folder_id: i32, user_id: i32) -> AppResult<Option<Grant>> {
        let row = folder_permission::Entity::find()
            .filter(folder_permission::Column::FolderId.eq(folder_id))
            .filter(folder_permission::Column::UserId.eq(user_id))
            .one(self.0)
            .await?;
        Ok(row.as_ref().map(Grant::from))
    }
}

/// Pure access decision once the grant row (if any) is known
pub fn decide(folder: &folder::Model, user_id: i32, grant: Option<Grant>, action: Action) -> bool {
    if folder.deleted {
        return false;
    }
    if folder.owner_id == user_id {
        return true;
    }
    grant.map_or(false, |g| g.allows(action))
}

pub async fn can_access<S>(
    store: &S,
    folder: &folder::Model,
    user_id: i32,
    action: Action,
) -> AppResult<bool>
where
    S: PermissionStore + ?Sized,
{
    if folder.deleted {
        return Ok(false);
    }
    if folder.owner_id == user_id {
        return Ok(true);
    }
    let grant = store.get(folder.id, user_id).await?;
    Ok(decide(folder, user_id, grant, action))
}

/// Like [`can_access`] but a refusal becomes `Forbidden`
pub async fn require<S>(
    store: &S,
    folder: &folder::Model,
    user_id: i32,
    action: Action,
) -> AppResult<()>
where
    S: PermissionStore + ?Sized,
{
    if can_access(store, folder, user_id, action).await? {
        Ok(())
    } else {
        tracing::debug!(
            folder_id = folder.id,
            user_id,
            action = action.as_str(),
            "Access denied"
        );
        Err(AppError::Forbidden)
    }
}

/// Ids of every folder on which the user holds a read grant
pub async fn readable_folder_ids<C: ConnectionTrait>(conn: &C, user_id: i32) -> AppResult<HashSet<i32>> {
    let ids: Vec<i32> = folder_permission::Entity::find()
        .select_only()
        .column(folder_permission::Column::FolderId)
        .filter(folder_permission::Column::UserId.eq(user_id))
        .filter(folder_permission::Column::CanRead.eq(true))
        .into_tuple()
        .all(conn)
        .await?;
    Ok(ids.into_iter().collect())
}

/// Current grant set of a folder keyed by user
pub async fn folder_grants<C: ConnectionTrait>(conn: &C, folder_id: i32) -> AppResult<HashMap<i32, Grant>> {
    let rows = folder_permission::Entity::find()
        .filter(folder_permission::Column::FolderId.eq(folder_id))
        .all(conn)
        .await?;
    Ok(rows.iter().map(|r| (r.user_id, Grant::from(r))).collect())
}

/// How one user's grant moved between two snapshots
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrantChange {
    Added(Grant),
    Removed(Grant),
    Changed { before: Grant, after: Grant },
}

impl GrantChange {
    /// Human readable summary of the change
    pub fn summary(&self) -> String {
        match self {
            GrantChange::Added(g) => format!("granted {}", join_actions(&g.actions())),
            GrantChange::Removed(_) => "access removed".to_string(),
            GrantChange::Changed { before, after } => {
                let added: Vec<Action> = Action::ALL
                    .into_iter()
                    .filter(|a| after.allows(*a) && !before.allows(*a))
                    .collect();
                let removed: Vec<Action> = Action::ALL
                    .into_iter()
                    .filter(|a| before.allows(*a) && !after.allows(*a))
                    .collect();
                let mut parts = Vec::new();
                if !added.is_empty() {
                    parts.push(format!("added {}", join_actions(&added)));
                }
                if !removed.is_empty() {
                    parts.push(format!("removed {}", join_actions(&removed)));
                }
                parts.join("; ")
            }
        }
    }
}

fn join_actions(actions: &[Action]) -> String {
    actions
        .iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Per-user difference between two grant snapshots.
///
/// Empty grants count as absent. Users in `excluded` (owner, actor) never
/// appear in the result, and neither do users whose grant is unchanged.
pub fn grant_delta(
    before: &HashMap<i32, Grant>,
    after: &HashMap<i32, Grant>,
    excluded: &[i32],
) -> BTreeMap<i32, GrantChange> {
    let users: HashSet<i32> = before.keys().chain(after.keys()).copied().collect();
    let mut delta = BTreeMap::new();

    for user_id in users {
        if excluded.contains(&user_id) {
            continue;
        }
        let old = before.get(&user_id).copied().filter(|g| !g.is_empty());
        let new = after.get(&user_id).copied().filter(|g| !g.is_empty());
        let change = match (old, new) {
            (None, Some(g)) => GrantChange::Added(g),
            (Some(g), None) => GrantChange::Removed(g),
            (Some(b), Some(a)) if b != a => GrantChange::Changed { before: b, after: a },
            _ => continue,
        };
        delta.insert(user_id, change);
    }

    delta
}
