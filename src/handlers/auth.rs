//! Authentication handlers
//!
//! Implements login, logout, registration and current user endpoints

use axum::{Extension, Json, extract::State};
use serde::Deserialize;
use tower_sessions::Session;

use crate::entity::user::UserResponse;
use crate::error::AppError;
use crate::handlers::{ok, ApiResult};
use crate::middleware::auth::{CurrentUser, SESSION_TIMESTAMP_KEY, SESSION_USER_KEY};
use crate::service::{self, Registration};
use crate::state::AppState;

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

fn session_error(e: tower_sessions::session::Error) -> AppError {
    AppError::Internal(format!("Failed to save session: {}", e))
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> ApiResult<UserResponse> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("email and password are required".to_string()));
    }

    let user = match state.drive.login(&req.email, &req.password).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("Login failed for {}: {}", req.email.trim(), e);
            return Err(e);
        }
    };

    session.cycle_id().await.map_err(session_error)?;
    session.insert(SESSION_USER_KEY, user.id).await.map_err(session_error)?;
    if let Err(e) = session
        .insert(SESSION_TIMESTAMP_KEY, chrono::Utc::now().timestamp())
        .await
    {
        tracing::error!("Failed to save session timestamp: {}", e);
    }

    ok(UserResponse::from(user))
}

/// POST /api/logout
pub async fn logout(session: Session) -> ApiResult<()> {
    if let Err(e) = session.flush().await {
        tracing::error!("Failed to clear session: {}", e);
    }
    ok(())
}

/// POST /api/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<Registration>,
) -> ApiResult<UserResponse> {
    let user = state.drive.register(req).await?;
    ok(UserResponse::from(user))
}

/// GET /api/user/current
pub async fn current_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> ApiResult<UserResponse> {
    let user = service::find_user(state.drive.db(), current_user.id).await?;
    ok(UserResponse::from(user))
}
