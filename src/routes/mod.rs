use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tower_sessions::{MemoryStore, SessionManagerLayer};

use crate::handlers;
use crate::middleware::auth_layer;
use crate::state::AppState;
use crate::ws;

pub mod health;

/// Room for multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: true,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    // Session store (in-memory)
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(state.config.session.secure)
        .with_http_only(true);

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = state.config.max_upload_size.saturating_add(MULTIPART_OVERHEAD);

    // API routes
    let api_routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Auth routes
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .route("/register", post(handlers::auth::register))
        .route("/user/current", get(handlers::auth::current_user))
        // User administration
        .route(
            "/users",
            get(handlers::user::list_users).post(handlers::user::add_user),
        )
        .route("/users/:id", delete(handlers::user::delete_user))
        .route("/users/:id/approve", post(handlers::user::approve_user))
        .route("/users/:id/deactivate", post(handlers::user::deactivate_user))
        .route("/users/:id/role", post(handlers::user::change_role))
        // Folder routes
        .route("/folders", post(handlers::folder::create_folder))
        .route("/folders/home", get(handlers::folder::home))
        .route("/folders/explore", get(handlers::folder::explore))
        .route("/folders/:id", get(handlers::folder::open_folder))
        .route("/folders/:id/children", get(handlers::folder::list_children))
        .route("/folders/:id/rename", post(handlers::folder::rename_folder))
        .route("/folders/:id/delete", post(handlers::folder::delete_folder))
        .route("/folders/:id/restore", post(handlers::folder::restore_folder))
        .route("/folders/:id/purge", post(handlers::folder::purge_folder))
        .route("/folders/:id/download", get(handlers::folder::download_folder))
        .route(
            "/folders/:id/permissions",
            get(handlers::folder::get_permissions).post(handlers::folder::update_permissions),
        )
        .route(
            "/folders/:id/upload",
            post(handlers::file::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // File routes
        .route("/files/:id/download", get(handlers::file::download_file))
        .route("/files/:id/rename", post(handlers::file::rename_file))
        .route("/files/:id/delete", post(handlers::file::delete_file))
        .route("/files/:id/restore", post(handlers::file::restore_file))
        .route("/files/:id/purge", post(handlers::file::purge_file))
        .route("/files/:id/favorite", post(handlers::file::toggle_favorite))
        .route("/favorites", get(handlers::file::list_favorites))
        // Trash routes
        .route("/trash", get(handlers::trash::list_trash))
        .route("/trash/empty", post(handlers::trash::empty_trash))
        // Notification routes
        .route("/notifications", get(handlers::notification::list_notifications))
        .route(
            "/notifications/unread_count",
            get(handlers::notification::unread_count),
        )
        .route(
            "/notifications/read_all",
            post(handlers::notification::mark_all_read),
        )
        .route("/notifications/:id/read", post(handlers::notification::mark_read))
        // Activity, search and stats
        .route("/recent", get(handlers::dashboard::recent))
        .route("/search", get(handlers::dashboard::search))
        .route("/storage/total", get(handlers::dashboard::storage_total))
        .route("/user-stats", get(handlers::dashboard::user_stats))
        // WebSocket
        .route("/ws", get(ws::serve_ws));

    Router::new()
        .nest("/api", api_routes)
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Fallback handler for 404
pub async fn fallback() -> (StatusCode, Json<ApiResponse<()>>) {
    (StatusCode::NOT_FOUND, Json(ApiResponse::error("Not Found")))
}
