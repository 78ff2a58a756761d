//! Notification entity - per-user inbox messages
//!
//! Table: portal_notification

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "portal_notification")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Recipient
    #[sea_orm(indexed)]
    pub user_id: i32,

    #[sea_orm(column_type = "String(Some(100))")]
    pub title: String,

    #[sea_orm(column_type = "String(Some(255))")]
    pub message: String,

    #[sea_orm(column_type = "String(Some(255))")]
    pub url: String,

    pub is_read: bool,

    /// Unix timestamp
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Notification response item
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationItem {
    pub id: i32,
    pub title: String,
    pub message: String,
    pub url: String,
    #[serde(rename = "isRead")]
    pub is_read: bool,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

impl From<Model> for NotificationItem {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            message: model.message,
            url: model.url,
            is_read: model.is_read,
            created_at: model.created_at,
        }
    }
}
