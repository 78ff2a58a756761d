//! Search bar and dashboard counters

use sea_orm::sea_query::{Expr, Func, LikeExpr};
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::Serialize;
use std::collections::HashSet;

use super::Drive;
use crate::entity::file::{self, FileItem};
use crate::entity::folder::{self, FolderItem};
use crate::entity::{favorite, folder_permission};
use crate::error::AppResult;
use crate::middleware::auth::CurrentUser;
use crate::permission;
use crate::tree::FolderTree;

pub const MIN_QUERY_CHARS: usize = 2;
const MAX_HITS: u64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct FileHit {
    #[serde(flatten)]
    pub file: FileItem,
    /// Names of the containing folders, root first
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderHit {
    #[serde(flatten)]
    pub folder: FolderItem,
    /// Names of the ancestors, root first
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub files: Vec<FileHit>,
    pub folders: Vec<FolderHit>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub total_owned_folders: u64,
    pub personal_folders: u64,
    pub shared_by_me: u64,
    pub shared_with_me: u64,
    pub total_files: u64,
    pub favorite_files: u64,
}

/// Substring pattern over lower-cased text; `%`, `_` and `\` match literally
fn contains_pattern(query: &str) -> LikeExpr {
    let mut pattern = String::from("%");
    for c in query.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    LikeExpr::new(pattern).escape('\\')
}

fn trail(tree: &FolderTree, folder_id: i32, include_self: bool) -> String {
    let mut names: Vec<&str> = tree.breadcrumb(folder_id).into_iter().map(|f| f.name.as_str()).collect();
    if !include_self {
        names.pop();
    }
    names.join(" / ")
}

impl Drive {
    /// Case-insensitive name search over files and folders the user can read.
    ///
    /// Queries shorter than two characters return nothing.
    pub async fn search(&self, actor: &CurrentUser, query: &str) -> AppResult<SearchResults> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            return Ok(SearchResults::default());
        }

        let readable: Vec<i32> = permission::readable_folder_ids(&self.db, actor.id)
            .await?
            .into_iter()
            .collect();
        let visible_folder = Condition::all().add(folder::Column::Deleted.eq(false)).add(
            Condition::any()
                .add(folder::Column::OwnerId.eq(actor.id))
                .add(folder::Column::Id.is_in(readable)),
        );

        let folders = folder::Entity::find()
            .filter(visible_folder.clone())
            .filter(Expr::expr(Func::lower(Expr::col(folder::Column::Name))).like(contains_pattern(query)))
            .order_by_desc(folder::Column::CreatedAt)
            .order_by_desc(folder::Column::Id)
            .limit(MAX_HITS)
            .all(&self.db)
            .await?;

        let open_folders: Vec<i32> = folder::Entity::find()
            .select_only()
            .column(folder::Column::Id)
            .filter(visible_folder)
            .into_tuple()
            .all(&self.db)
            .await?;
        let files = file::Entity::find()
            .filter(file::Column::Deleted.eq(false))
            .filter(
                Condition::any()
                    .add(file::Column::OwnerId.eq(actor.id))
                    .add(file::Column::FolderId.is_in(open_folders)),
            )
            .filter(Expr::expr(Func::lower(Expr::col(file::Column::OriginalName))).like(contains_pattern(query)))
            .order_by_desc(file::Column::UploadedAt)
            .order_by_desc(file::Column::Id)
            .limit(MAX_HITS)
            .all(&self.db)
            .await?;

        let crumb_ids: Vec<i32> = files
            .iter()
            .filter_map(|f| f.folder_id)
            .chain(folders.iter().map(|f| f.id))
            .collect();
        let tree = FolderTree::load_ancestors(&self.db, crumb_ids).await?;
        Ok(SearchResults {
            files: files
                .into_iter()
                .map(|f| FileHit {
                    path: f.folder_id.map(|id| trail(&tree, id, true)).unwrap_or_default(),
                    file: f.into(),
                })
                .collect(),
            folders: folders
                .into_iter()
                .map(|f| FolderHit {
                    path: trail(&tree, f.id, false),
                    folder: f.into(),
                })
                .collect(),
        })
    }

    /// Bytes held by the user's files outside the trash
    pub async fn storage_total(&self, actor: &CurrentUser) -> AppResult<u64> {
        let sizes: Vec<i64> = file::Entity::find()
            .select_only()
            .column(file::Column::Size)
            .filter(file::Column::OwnerId.eq(actor.id))
            .filter(file::Column::Deleted.eq(false))
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(sizes.into_iter().map(|s| s.max(0) as u64).sum())
    }

    pub async fn user_stats(&self, actor: &CurrentUser) -> AppResult<UserStats> {
        let owned: Vec<folder::Model> = folder::Entity::find()
            .filter(folder::Column::OwnerId.eq(actor.id))
            .filter(folder::Column::Deleted.eq(false))
            .all(&self.db)
            .await?;
        let owned_ids: Vec<i32> = owned.iter().map(|f| f.id).collect();

        let shared_rows: Vec<i32> = folder_permission::Entity::find()
            .select_only()
            .column(folder_permission::Column::FolderId)
            .filter(folder_permission::Column::FolderId.is_in(owned_ids))
            .filter(folder_permission::Column::UserId.ne(actor.id))
            .into_tuple()
            .all(&self.db)
            .await?;
        let shared_by_me: HashSet<i32> = shared_rows.into_iter().collect();

        let received: HashSet<i32> = permission::readable_folder_ids(&self.db, actor.id).await?;

        let total_files = file::Entity::find()
            .filter(file::Column::OwnerId.eq(actor.id))
            .filter(file::Column::Deleted.eq(false))
            .count(&self.db)
            .await?;
        let favorite_files = favorite::Entity::find()
            .filter(favorite::Column::UserId.eq(actor.id))
            .count(&self.db)
            .await?;

        Ok(UserStats {
            total_owned_folders: owned.len() as u64,
            personal_folders: owned.iter().filter(|f| f.is_personal).count() as u64,
            shared_by_me: shared_by_me.len() as u64,
            shared_with_me: received.len() as u64,
            total_files,
            favorite_files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::user::Role;
    use crate::permission::Grant;
    use crate::service::{NewFolder, NewUpload, UserGrant};
    use crate::test_support::{fixture, Fixture};

    async fn mkdir(
        fx: &Fixture,
        owner: &CurrentUser,
        name: &str,
        parent_id: Option<i32>,
        is_personal: bool,
    ) -> folder::Model {
        fx.drive
            .create_folder(
                owner,
                NewFolder {
                    name: name.to_string(),
                    description: None,
                    is_personal,
                    parent_id,
                    grants: Vec::new(),
                },
            )
            .await
            .unwrap()
    }

    async fn put(fx: &Fixture, owner: &CurrentUser, folder_id: i32, name: &str, bytes: &[u8]) -> file::Model {
        fx.drive
            .upload_file(
                owner,
                NewUpload {
                    folder_id,
                    original_name: name.to_string(),
                    mime_type: None,
                    bytes: bytes.to_vec(),
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_search_only_returns_readable_items() {
        let fx = fixture().await;
        let alice = CurrentUser::from(&fx.user("alice", Role::User).await);
        let bob = CurrentUser::from(&fx.user("bob", Role::User).await);

        let shared = mkdir(&fx, &alice, "Budget shared", None, false).await;
        let sub = mkdir(&fx, &alice, "Q1", Some(shared.id), false).await;
        let private = mkdir(&fx, &alice, "Budget private", None, false).await;
        let read = Grant { read: true, ..Grant::default() };
        fx.drive
            .update_permissions(&alice, shared.id, vec![UserGrant { user_id: bob.id, grant: read }])
            .await
            .unwrap();
        put(&fx, &alice, shared.id, "budget-2024.csv", b"1").await;
        put(&fx, &alice, private.id, "budget-secret.csv", b"1").await;
        put(&fx, &alice, sub.id, "budget-q1.csv", b"1").await;

        let hits = fx.drive.search(&bob, "BUDGET").await.unwrap();
        assert_eq!(hits.folders.len(), 1);
        assert_eq!(hits.folders[0].folder.id, shared.id);
        assert_eq!(hits.files.len(), 1);
        assert_eq!(hits.files[0].file.original_name, "budget-2024.csv");
        assert_eq!(hits.files[0].path, "Budget shared");

        let mine = fx.drive.search(&alice, "q1").await.unwrap();
        assert_eq!(mine.folders.len(), 1);
        assert_eq!(mine.folders[0].path, "Budget shared");
        assert_eq!(mine.files[0].path, "Budget shared / Q1");

        assert!(fx.drive.search(&alice, " b ").await.unwrap().files.is_empty());
    }

    #[tokio::test]
    async fn test_search_wildcards_match_literally() {
        let fx = fixture().await;
        let alice = CurrentUser::from(&fx.user("alice", Role::User).await);
        let docs = mkdir(&fx, &alice, "Docs", None, false).await;
        put(&fx, &alice, docs.id, "5% growth.csv", b"1").await;
        put(&fx, &alice, docs.id, "50 growth.csv", b"1").await;
        put(&fx, &alice, docs.id, "a_b.csv", b"1").await;
        put(&fx, &alice, docs.id, "axb.csv", b"1").await;

        let hits = fx.drive.search(&alice, "__").await.unwrap();
        assert!(hits.files.is_empty());
        assert!(hits.folders.is_empty());

        let names = |r: &SearchResults| -> Vec<String> {
            r.files.iter().map(|h| h.file.original_name.clone()).collect()
        };
        assert_eq!(names(&fx.drive.search(&alice, "5%").await.unwrap()), vec!["5% growth.csv"]);
        assert_eq!(names(&fx.drive.search(&alice, "A_B").await.unwrap()), vec!["a_b.csv"]);
        assert_eq!(fx.drive.search(&alice, "growth").await.unwrap().files.len(), 2);
    }

    #[tokio::test]
    async fn test_storage_total_and_stats() {
        let fx = fixture().await;
        let alice = CurrentUser::from(&fx.user("alice", Role::User).await);
        let bob = CurrentUser::from(&fx.user("bob", Role::User).await);

        let shared = mkdir(&fx, &alice, "Shared", None, false).await;
        mkdir(&fx, &alice, "Mine", None, true).await;
        let read = Grant { read: true, ..Grant::default() };
        fx.drive
            .update_permissions(&alice, shared.id, vec![UserGrant { user_id: bob.id, grant: read }])
            .await
            .unwrap();
        let a = put(&fx, &alice, shared.id, "a.csv", b"12345").await;
        let b = put(&fx, &alice, shared.id, "b.csv", b"123").await;
        fx.drive.toggle_favorite(&alice, a.id).await.unwrap();
        fx.drive.soft_delete_file(&alice, b.id).await.unwrap();

        assert_eq!(fx.drive.storage_total(&alice).await.unwrap(), 5);
        assert_eq!(
            fx.drive.user_stats(&alice).await.unwrap(),
            UserStats {
                total_owned_folders: 2,
                personal_folders: 1,
                shared_by_me: 1,
                shared_with_me: 0,
                total_files: 1,
                favorite_files: 1,
            }
        );
        assert_eq!(fx.drive.user_stats(&bob).await.unwrap().shared_with_me, 1);
    }
}
