//! User entity - portal accounts
//!
//! Table: portal_user

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account role
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            "super_admin" => Some(Role::SuperAdmin),
            _ => None,
        }
    }

    /// Admins and super admins manage accounts
    pub fn can_manage_users(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "portal_user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Login email (unique, lower-cased)
    #[sea_orm(column_type = "String(Some(150))", unique)]
    pub email: String,

    /// bcrypt hash, or a legacy plaintext credential awaiting upgrade
    #[sea_orm(column_type = "String(Some(128))")]
    #[serde(skip_serializing)]
    pub password: String,

    #[sea_orm(column_type = "String(Some(100))")]
    pub name: String,

    /// user | admin | super_admin
    #[sea_orm(column_type = "String(Some(20))")]
    pub role: String,

    pub active: bool,

    /// Account that created this one
    pub created_by: Option<i32>,

    /// Unix timestamp
    pub created_at: i64,

    pub last_login: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

// Relations are resolved with explicit queries

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Unknown role strings degrade to a plain user
    pub fn role(&self) -> Role {
        Role::parse(&self.role).unwrap_or(Role::User)
    }

    pub fn is_super_admin(&self) -> bool {
        self.role() == Role::SuperAdmin
    }
}

/// User response (no credential)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub role: String,
    pub active: bool,
    #[serde(rename = "createdBy")]
    pub created_by: Option<i32>,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "lastLogin")]
    pub last_login: Option<i64>,
}

impl From<Model> for UserResponse {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            name: model.name,
            role: model.role,
            active: model.active,
            created_by: model.created_by,
            created_at: model.created_at,
            last_login: model.last_login,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip_and_fallback() {
        assert_eq!(Role::parse("super_admin"), Some(Role::SuperAdmin));
        assert_eq!(Role::parse("root"), None);
        assert!(Role::Admin.can_manage_users());
        assert!(!Role::User.can_manage_users());
    }
}
