//! Account lifecycle: registration, approval, roles, login and deletion

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait, Value,
};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::info;

use super::folder_ops::grant_row;
use super::{clean_name, find_user, super_admins, Drive, Outbox};
use crate::entity::user::{self, Role};
use crate::entity::{activity, favorite, file, folder, folder_permission, notification};
use crate::error::{AppError, AppResult};
use crate::ledger;
use crate::middleware::auth::CurrentUser;
use crate::permission::Grant;

const MAX_EMAIL: usize = 150;
const MAX_USER_NAME: usize = 100;
const MIN_PASSWORD: usize = 6;

/// Self-service sign-up
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Account created by an administrator
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::User
}

fn clean_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    };
    if !valid || email.chars().count() > MAX_EMAIL || email.chars().any(char::is_whitespace) {
        return Err(AppError::Validation(format!("invalid email address: {}", raw.trim())));
    }
    Ok(email)
}

fn check_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD {
        return Err(AppError::Validation(format!(
            "password must have at least {} characters",
            MIN_PASSWORD
        )));
    }
    Ok(())
}

fn require_manager(actor: &CurrentUser) -> AppResult<()> {
    if actor.can_manage_users() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn require_super_admin(actor: &CurrentUser) -> AppResult<()> {
    if actor.is_super_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

async fn ensure_email_free<C: ConnectionTrait>(conn: &C, email: &str) -> AppResult<()> {
    let taken = user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .count(conn)
        .await?;
    if taken > 0 {
        return Err(AppError::Conflict(format!("email already registered: {}", email)));
    }
    Ok(())
}

async fn active_super_admins<C: ConnectionTrait>(conn: &C) -> AppResult<u64> {
    let n = user::Entity::find()
        .filter(user::Column::Role.eq(Role::SuperAdmin.as_str()))
        .filter(user::Column::Active.eq(true))
        .count(conn)
        .await?;
    Ok(n)
}

/// Refuse to take away the last active super admin
async fn guard_last_super_admin<C: ConnectionTrait>(
    conn: &C,
    target: &user::Model,
    outcome: &str,
) -> AppResult<()> {
    if target.is_super_admin() && target.active && active_super_admins(conn).await? <= 1 {
        return Err(AppError::LastAdmin(outcome.to_string()));
    }
    Ok(())
}

/// Give a super admin a full grant row on every folder
async fn grant_all_folders<C: ConnectionTrait>(conn: &C, user_id: i32) -> AppResult<usize> {
    folder_permission::Entity::update_many()
        .col_expr(folder_permission::Column::CanRead, Expr::value(true))
        .col_expr(folder_permission::Column::CanEdit, Expr::value(true))
        .col_expr(folder_permission::Column::CanDelete, Expr::value(true))
        .col_expr(folder_permission::Column::CanDownload, Expr::value(true))
        .filter(folder_permission::Column::UserId.eq(user_id))
        .exec(conn)
        .await?;

    let existing: Vec<i32> = folder_permission::Entity::find()
        .select_only()
        .column(folder_permission::Column::FolderId)
        .filter(folder_permission::Column::UserId.eq(user_id))
        .into_tuple()
        .all(conn)
        .await?;
    let existing: HashSet<i32> = existing.into_iter().collect();

    let all: Vec<i32> = folder::Entity::find()
        .select_only()
        .column(folder::Column::Id)
        .into_tuple()
        .all(conn)
        .await?;
    let rows: Vec<_> = all
        .into_iter()
        .filter(|id| !existing.contains(id))
        .map(|folder_id| grant_row(folder_id, user_id, Grant::FULL))
        .collect();

    let added = rows.len();
    if added > 0 {
        folder_permission::Entity::insert_many(rows).exec(conn).await?;
    }
    Ok(added)
}

impl Drive {
    fn users_page_url(&self) -> String {
        format!("{}/admin/users", self.config.public_url.trim_end_matches('/'))
    }

    /// Sign up. The account stays inactive until an administrator approves it.
    pub async fn register(&self, reg: Registration) -> AppResult<user::Model> {
        let name = clean_name(&reg.name, MAX_USER_NAME)?;
        let email = clean_email(&reg.email)?;
        check_password(&reg.password)?;
        let password = self.hasher.hash(&reg.password)?;

        let txn = self.db.begin().await?;
        ensure_email_free(&txn, &email).await?;

        let created = user::ActiveModel {
            email: Set(email),
            password: Set(password),
            name: Set(name),
            role: Set(Role::User.as_str().to_string()),
            active: Set(false),
            created_by: Set(None),
            created_at: Set(ledger::now()),
            last_login: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut outbox = Outbox::default();
        let url = self.users_page_url();
        let message = format!("{} ({}) is waiting for approval", created.name, created.email);
        for admin in super_admins(&txn).await? {
            outbox.notify(&txn, admin.id, "New registration", &message, &url).await?;
            outbox.mail(&admin.email, "New registration", format!("{}\n{}", message, url));
        }

        txn.commit().await?;
        self.flush(outbox).await;

        info!(user_id = created.id, "User registered, pending approval");
        Ok(created)
    }

    /// Create an active account. Only super admins create super admins.
    pub async fn create_user(&self, actor: &CurrentUser, req: NewUser) -> AppResult<user::Model> {
        require_manager(actor)?;
        if req.role == Role::SuperAdmin {
            require_super_admin(actor)?;
        }
        let name = clean_name(&req.name, MAX_USER_NAME)?;
        let email = clean_email(&req.email)?;
        check_password(&req.password)?;
        let password = self.hasher.hash(&req.password)?;

        let txn = self.db.begin().await?;
        ensure_email_free(&txn, &email).await?;

        let created = user::ActiveModel {
            email: Set(email),
            password: Set(password),
            name: Set(name),
            role: Set(req.role.as_str().to_string()),
            active: Set(true),
            created_by: Set(Some(actor.id)),
            created_at: Set(ledger::now()),
            last_login: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        if req.role == Role::SuperAdmin {
            grant_all_folders(&txn, created.id).await?;
        }
        txn.commit().await?;

        info!(user_id = created.id, role = req.role.as_str(), created_by = actor.id, "User created");
        Ok(created)
    }

    pub async fn list_users(&self, actor: &CurrentUser) -> AppResult<Vec<user::Model>> {
        require_manager(actor)?;
        let users = user::Entity::find()
            .order_by_asc(user::Column::Id)
            .all(&self.db)
            .await?;
        Ok(users)
    }

    /// Activate a pending account and tell its owner
    pub async fn approve_user(&self, actor: &CurrentUser, user_id: i32) -> AppResult<user::Model> {
        require_manager(actor)?;

        let txn = self.db.begin().await?;
        let target = find_user(&txn, user_id).await?;
        if target.active {
            return Ok(target);
        }

        let mut active: user::ActiveModel = target.into();
        active.active = Set(true);
        let approved = active.update(&txn).await?;

        let mut outbox = Outbox::default();
        let url = self.config.public_url.clone();
        let message = format!("{} approved your account", actor.name);
        outbox.notify(&txn, approved.id, "Account approved", &message, &url).await?;
        outbox.mail(&approved.email, "Account approved", format!("{}\n{}", message, url));

        txn.commit().await?;
        self.flush(outbox).await;

        info!(user_id, approved_by = actor.id, "User approved");
        Ok(approved)
    }

    pub async fn deactivate_user(&self, actor: &CurrentUser, user_id: i32) -> AppResult<user::Model> {
        require_manager(actor)?;
        if user_id == actor.id {
            return Err(AppError::Validation("cannot deactivate yourself".to_string()));
        }

        let txn = self.db.begin().await?;
        let target = find_user(&txn, user_id).await?;
        if target.is_super_admin() {
            require_super_admin(actor)?;
        }
        if !target.active {
            return Ok(target);
        }
        guard_last_super_admin(&txn, &target, "deactivated").await?;

        let mut active: user::ActiveModel = target.into();
        active.active = Set(false);
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(user_id, deactivated_by = actor.id, "User deactivated");
        Ok(updated)
    }

    /// Change a user's role. Promotion to super admin backfills full grants
    /// on every folder; existing rows are left in place on demotion.
    pub async fn change_role(&self, actor: &CurrentUser, user_id: i32, role: Role) -> AppResult<user::Model> {
        require_super_admin(actor)?;

        let txn = self.db.begin().await?;
        let target = find_user(&txn, user_id).await?;
        let current = target.role();
        if current == role {
            return Ok(target);
        }
        if current == Role::SuperAdmin {
            guard_last_super_admin(&txn, &target, "demoted").await?;
        }

        let mut active: user::ActiveModel = target.into();
        active.role = Set(role.as_str().to_string());
        let updated = active.update(&txn).await?;
        if role == Role::SuperAdmin {
            let added = grant_all_folders(&txn, user_id).await?;
            tracing::debug!(user_id, added, "Backfilled super admin grants");
        }
        txn.commit().await?;

        info!(user_id, from = current.as_str(), to = role.as_str(), "Role changed");
        Ok(updated)
    }

    /// Check credentials. A legacy plaintext credential is replaced by its
    /// hash on the first successful login.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<user::Model> {
        let email = email.trim().to_lowercase();
        let Some(found) = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(&self.db)
            .await?
        else {
            tracing::debug!("Login for unknown email {}", email);
            return Err(AppError::Unauthorized);
        };

        let check = self.hasher.verify_and_maybe_upgrade(&found.password, password)?;
        if !check.ok {
            return Err(AppError::Unauthorized);
        }
        if !found.active {
            return Err(AppError::Forbidden);
        }

        let mut active: user::ActiveModel = found.into();
        if let Some(hash) = check.upgraded {
            active.password = Set(hash);
        }
        active.last_login = Set(Some(ledger::now()));
        let logged_in = active.update(&self.db).await?;

        info!(user_id = logged_in.id, "User logged in");
        Ok(logged_in)
    }

    /// Remove an account.
    ///
    /// Folders and files pass to the acting super admin. Grants, favorites,
    /// notifications and activity of the removed user are deleted, and
    /// accounts it created lose their creator link.
    pub async fn delete_user(&self, actor: &CurrentUser, user_id: i32) -> AppResult<()> {
        require_super_admin(actor)?;
        if user_id == actor.id {
            return Err(AppError::Validation("cannot delete yourself".to_string()));
        }

        let txn = self.db.begin().await?;
        let target = find_user(&txn, user_id).await?;
        guard_last_super_admin(&txn, &target, "deleted").await?;
        let heir = actor.id;

        let folders = folder::Entity::update_many()
            .col_expr(folder::Column::OwnerId, Expr::value(heir))
            .filter(folder::Column::OwnerId.eq(user_id))
            .exec(&txn)
            .await?
            .rows_affected;
        let files = file::Entity::update_many()
            .col_expr(file::Column::OwnerId, Expr::value(heir))
            .filter(file::Column::OwnerId.eq(user_id))
            .exec(&txn)
            .await?
            .rows_affected;

        folder_permission::Entity::delete_many()
            .filter(folder_permission::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        favorite::Entity::delete_many()
            .filter(favorite::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        notification::Entity::delete_many()
            .filter(notification::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        activity::Entity::delete_many()
            .filter(activity::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        user::Entity::update_many()
            .col_expr(user::Column::CreatedBy, Expr::value(Value::Int(None)))
            .filter(user::Column::CreatedBy.eq(user_id))
            .exec(&txn)
            .await?;
        user::Entity::delete_by_id(user_id).exec(&txn).await?;

        txn.commit().await?;

        info!(user_id, heir, folders, files, "User deleted, ownership transferred");
        Ok(())
    }
}
