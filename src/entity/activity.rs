//! Activity entity - append-only audit trail
//!
//! Table: portal_activity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Action tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Created,
    Uploaded,
    Renamed,
    Opened,
    Downloaded,
    Deleted,
    Restored,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Created => "created",
            ActivityAction::Uploaded => "uploaded",
            ActivityAction::Renamed => "renamed",
            ActivityAction::Opened => "opened",
            ActivityAction::Downloaded => "downloaded",
            ActivityAction::Deleted => "deleted",
            ActivityAction::Restored => "restored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(ActivityAction::Created),
            "uploaded" => Some(ActivityAction::Uploaded),
            "renamed" => Some(ActivityAction::Renamed),
            "opened" => Some(ActivityAction::Opened),
            "downloaded" => Some(ActivityAction::Downloaded),
            "deleted" => Some(ActivityAction::Deleted),
            "restored" => Some(ActivityAction::Restored),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "portal_activity")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Actor
    pub user_id: i32,

    pub file_id: Option<i32>,

    pub folder_id: Option<i32>,

    #[sea_orm(column_type = "String(Some(50))")]
    pub action: String,

    /// Unix timestamp
    #[sea_orm(indexed)]
    pub timestamp: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Activity response item
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityItem {
    pub id: i32,
    #[serde(rename = "userId")]
    pub user_id: i32,
    #[serde(rename = "fileId")]
    pub file_id: Option<i32>,
    #[serde(rename = "folderId")]
    pub folder_id: Option<i32>,
    pub action: String,
    pub timestamp: i64,
}

impl From<Model> for ActivityItem {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            file_id: model.file_id,
            folder_id: model.folder_id,
            action: model.action,
            timestamp: model.timestamp,
        }
    }
}
