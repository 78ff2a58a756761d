//! FolderPermission entity - per-folder, per-user grants
//!
//! Table: portal_folder_permission, unique on (folder_id, user_id)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "portal_folder_permission")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub folder_id: i32,

    pub user_id: i32,

    pub can_read: bool,

    pub can_edit: bool,

    pub can_delete: bool,

    pub can_download: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
