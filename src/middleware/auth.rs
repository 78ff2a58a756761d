//! Authentication middleware
//!
//! Provides session-based authentication for API routes

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;

use crate::entity::user::{self, Role};
use crate::error::AppError;
use crate::service;
use crate::state::AppState;

/// Session key for storing the user id
pub const SESSION_USER_KEY: &str = "user";
pub const SESSION_TIMESTAMP_KEY: &str = "timestamp";

/// Authenticated principal, stored in request extensions
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub active: bool,
}

impl CurrentUser {
    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    pub fn can_manage_users(&self) -> bool {
        self.role.can_manage_users()
    }
}

impl From<&user::Model> for CurrentUser {
    fn from(model: &user::Model) -> Self {
        Self {
            id: model.id,
            email: model.email.clone(),
            name: model.name.clone(),
            role: model.role(),
            active: model.active,
        }
    }
}

/// Paths that don't require authentication
fn is_public_path(path: &str) -> bool {
    if !path.starts_with("/api") {
        return true;
    }
    matches!(
        path,
        "/api/login" | "/api/logout" | "/api/register" | "/api/health"
    )
}

/// Authentication middleware
pub async fn auth_layer(
    State(state): State<AppState>,
    session: Session,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let user_id: Option<i32> = session.get(SESSION_USER_KEY).await.unwrap_or(None);
    let Some(user_id) = user_id else {
        return AppError::Unauthorized.into_response();
    };

    match service::find_user(state.drive.db(), user_id).await {
        Ok(user_model) if user_model.active => {
            request.extensions_mut().insert(CurrentUser::from(&user_model));
            next.run(request).await
        }
        Ok(_) => {
            tracing::warn!("Inactive user {} rejected", user_id);
            let _ = session.flush().await;
            AppError::Unauthorized.into_response()
        }
        Err(AppError::NotFound(_)) => {
            tracing::warn!("User not found in database: {}", user_id);
            let _ = session.flush().await;
            AppError::Unauthorized.into_response()
        }
        Err(e) => {
            tracing::error!("Database error during auth: {}", e);
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/api/login"));
        assert!(is_public_path("/api/register"));
        assert!(is_public_path("/index.html"));
        assert!(!is_public_path("/api/folders"));
        assert!(!is_public_path("/api/ws"));
    }
}
