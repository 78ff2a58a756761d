//! Folder entity - nodes of the shared folder tree
//!
//! Table: portal_folder

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "portal_folder")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(column_type = "String(Some(150))")]
    pub name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub owner_id: i32,

    /// None for root folders
    pub parent_id: Option<i32>,

    pub is_personal: bool,

    /// Soft-delete marker (in the trash)
    pub deleted: bool,

    /// Unix timestamp
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

// Self reference and ownership are resolved with explicit queries

impl ActiveModelBehavior for ActiveModel {}

/// Folder response item
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FolderItem {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "ownerId")]
    pub owner_id: i32,
    #[serde(rename = "parentId")]
    pub parent_id: Option<i32>,
    #[serde(rename = "isPersonal")]
    pub is_personal: bool,
    pub deleted: bool,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

impl From<Model> for FolderItem {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            owner_id: model.owner_id,
            parent_id: model.parent_id,
            is_personal: model.is_personal,
            deleted: model.deleted,
            created_at: model.created_at,
        }
    }
}
