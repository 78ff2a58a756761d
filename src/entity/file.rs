//! File entity - uploaded documents
//!
//! Table: portal_file

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "portal_file")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Display name
    #[sea_orm(column_type = "String(Some(255))")]
    pub title: String,

    /// Blob store key (uuid + extension, never reused)
    #[sea_orm(column_type = "String(Some(255))", unique)]
    pub stored_name: String,

    #[sea_orm(column_type = "String(Some(255))")]
    pub original_name: String,

    #[sea_orm(column_type = "String(Some(100))")]
    pub mime_type: String,

    /// Size in bytes
    pub size: i64,

    pub folder_id: Option<i32>,

    pub owner_id: i32,

    #[sea_orm(column_type = "String(Some(20))")]
    pub visibility: String,

    pub deleted: bool,

    /// Unix timestamp
    pub uploaded_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// File response item
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileItem {
    pub id: i32,
    pub title: String,
    #[serde(rename = "originalName")]
    pub original_name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub size: i64,
    #[serde(rename = "folderId")]
    pub folder_id: Option<i32>,
    #[serde(rename = "ownerId")]
    pub owner_id: i32,
    pub visibility: String,
    pub deleted: bool,
    #[serde(rename = "uploadedAt")]
    pub uploaded_at: i64,
}

impl From<Model> for FileItem {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            original_name: model.original_name,
            mime_type: model.mime_type,
            size: model.size,
            folder_id: model.folder_id,
            owner_id: model.owner_id,
            visibility: model.visibility,
            deleted: model.deleted,
            uploaded_at: model.uploaded_at,
        }
    }
}
