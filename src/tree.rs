//! In-memory folder tree
//!
//! Built from one query, then walked without touching the database again.
//! Breadcrumbs only need the ancestor chain, which `load_ancestors` fetches
//! one level at a time.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use std::collections::{HashMap, HashSet};

use crate::entity::folder;
use crate::error::AppResult;

/// Adjacency view over a set of folders
#[derive(Debug, Default, Clone)]
pub struct FolderTree {
    nodes: HashMap<i32, folder::Model>,
    /// Child ids per parent, newest first
    children: HashMap<i32, Vec<i32>>,
}

impl FolderTree {
    /// Build from folders in any order
    pub fn from_folders(folders: impl IntoIterator<Item = folder::Model>) -> Self {
        let mut nodes: HashMap<i32, folder::Model> = HashMap::new();
        for f in folders {
            nodes.insert(f.id, f);
        }

        let mut children: HashMap<i32, Vec<i32>> = HashMap::new();
        for f in nodes.values() {
            if let Some(parent_id) = f.parent_id {
                children.entry(parent_id).or_default().push(f.id);
            }
        }
        for ids in children.values_mut() {
            ids.sort_by(|a, b| {
                let (fa, fb) = (&nodes[a], &nodes[b]);
                fb.created_at.cmp(&fa.created_at).then(fb.id.cmp(&fa.id))
            });
        }

        Self { nodes, children }
    }

    /// Load every folder row in a single query
    pub async fn load<C: ConnectionTrait>(conn: &C) -> AppResult<Self> {
        let folders = folder::Entity::find()
            .order_by_asc(folder::Column::Id)
            .all(conn)
            .await?;
        Ok(Self::from_folders(folders))
    }

    /// Load the given folders and every ancestor of them, one query per level
    pub async fn load_ancestors<C: ConnectionTrait>(
        conn: &C,
        ids: impl IntoIterator<Item = i32>,
    ) -> AppResult<Self> {
        let mut nodes: HashMap<i32, folder::Model> = HashMap::new();
        let mut wanted: Vec<i32> = ids.into_iter().collect();
        wanted.sort_unstable();
        wanted.dedup();

        while !wanted.is_empty() {
            let level = folder::Entity::find()
                .filter(folder::Column::Id.is_in(wanted))
                .all(conn)
                .await?;
            let mut parents: Vec<i32> = level.iter().filter_map(|f| f.parent_id).collect();
            for f in level {
                nodes.insert(f.id, f);
            }
            parents.retain(|p| !nodes.contains_key(p));
            parents.sort_unstable();
            parents.dedup();
            wanted = parents;
        }

        Ok(Self::from_folders(nodes.into_values()))
    }

    pub fn get(&self, id: i32) -> Option<&folder::Model> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct children, newest first, deleted ones included
    pub fn children(&self, id: i32) -> Vec<&folder::Model> {
        self.children
            .get(&id)
            .map(|ids| ids.iter().filter_map(|c| self.nodes.get(c)).collect())
            .unwrap_or_default()
    }

    /// The folder and all its descendants, depth-first pre-order.
    ///
    /// Returns an empty vec for an unknown root.
    pub fn subtree_ids(&self, root: i32) -> Vec<i32> {
        if !self.nodes.contains_key(&root) {
            return Vec::new();
        }

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            if let Some(kids) = self.children.get(&id) {
                // reversed so the newest child is visited first
                stack.extend(kids.iter().rev());
            }
        }
        out
    }

    /// Ancestors from the root down to and including the folder itself
    pub fn breadcrumb(&self, id: i32) -> Vec<&folder::Model> {
        let mut trail = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.nodes.get(&id);
        while let Some(f) = current {
            if !seen.insert(f.id) {
                tracing::warn!(folder_id = id, "Cycle in folder parents, breadcrumb truncated");
                break;
            }
            trail.push(f);
            current = f.parent_id.and_then(|p| self.nodes.get(&p));
        }
        trail.reverse();
        trail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i32, parent_id: Option<i32>, created_at: i64) -> folder::Model {
        folder::Model {
            id,
            name: format!("n{}", id),
            description: None,
            owner_id: 1,
            parent_id,
            is_personal: false,
            deleted: false,
            created_at,
        }
    }

    fn sample() -> FolderTree {
        //   1
        //  / \
        // 2   3
        //     |
        //     4
        FolderTree::from_folders(vec![
            node(4, Some(3), 40),
            node(1, None, 10),
            node(2, Some(1), 20),
            node(3, Some(1), 30),
            node(9, None, 90),
        ])
    }

    #[test]
    fn test_children_newest_first() {
        let tree = sample();
        let ids: Vec<i32> = tree.children(1).iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![3, 2]);
        assert!(tree.children(2).is_empty());
    }

    #[test]
    fn test_same_timestamp_orders_by_id() {
        let tree = FolderTree::from_folders(vec![node(1, None, 0), node(2, Some(1), 5), node(3, Some(1), 5)]);
        let ids: Vec<i32> = tree.children(1).iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_subtree_ids() {
        let tree = sample();
        assert_eq!(tree.subtree_ids(1), vec![1, 3, 4, 2]);
        assert_eq!(tree.subtree_ids(3), vec![3, 4]);
        assert_eq!(tree.subtree_ids(9), vec![9]);
        assert!(tree.subtree_ids(42).is_empty());
    }

    #[test]
    fn test_breadcrumb() {
        let tree = sample();
        let names: Vec<&str> = tree.breadcrumb(4).iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["n1", "n3", "n4"]);
        assert_eq!(tree.breadcrumb(1).len(), 1);
        assert!(tree.breadcrumb(42).is_empty());
    }

    #[test]
    fn test_cycle_does_not_hang() {
        let tree = FolderTree::from_folders(vec![node(1, Some(2), 0), node(2, Some(1), 0)]);
        assert_eq!(tree.breadcrumb(1).len(), 2);
        assert_eq!(tree.subtree_ids(1).len(), 2);
    }

    #[tokio::test]
    async fn test_load_ancestors_fetches_only_the_chain() {
        use sea_orm::{ActiveModelTrait, Set};

        let (db, _dir) = crate::test_support::test_db().await;
        for f in [
            node(1, None, 10),
            node(2, Some(1), 20),
            node(3, Some(2), 30),
            node(4, Some(1), 40),
            node(9, None, 90),
        ] {
            folder::ActiveModel {
                id: Set(f.id),
                name: Set(f.name),
                description: Set(None),
                owner_id: Set(f.owner_id),
                parent_id: Set(f.parent_id),
                is_personal: Set(false),
                deleted: Set(false),
                created_at: Set(f.created_at),
            }
            .insert(&db)
            .await
            .unwrap();
        }

        let tree = FolderTree::load_ancestors(&db, [3]).await.unwrap();
        assert_eq!(tree.len(), 3);
        let names: Vec<&str> = tree.breadcrumb(3).iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["n1", "n2", "n3"]);
        assert!(tree.get(4).is_none());
        assert!(tree.get(9).is_none());

        assert_eq!(FolderTree::load_ancestors(&db, [3, 4, 4]).await.unwrap().len(), 4);
        assert!(FolderTree::load_ancestors(&db, [42]).await.unwrap().is_empty());
    }
}
