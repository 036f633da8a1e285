//! HTTP surface: REST routes, the WebSocket upgrade route, CORS, and the
//! server entry points.
//!
//! Role gates follow the original route table: task create/update need
//! admin or manager, task delete needs admin. Gates run before any mutation
//! logic, so a forbidden request changes nothing.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::routing::{delete, get, patch};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use cloudboard_proto::task::{TaskId, TaskView};

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::gateway;
use crate::models::{
    Notification, NotificationPreference, PreferencePatch, Role, TaskDraft, TaskPatch,
};
use crate::state::AppState;
use crate::tasks;

/// Query parameters accepted by the task list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    /// Narrow the listing to one project. The literal `"all"` means no
    /// filter, matching the browser client's dropdown sentinel.
    pub project_id: Option<String>,
}

/// Builds the full application router.
#[must_use]
pub fn router(state: Arc<AppState>, frontend_origin: &str) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/ws", get(gateway::ws_handler))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", patch(update_task).delete(delete_task))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/read-all", patch(mark_all_read))
        .route(
            "/api/notifications/{id}",
            delete(delete_notification),
        )
        .route("/api/notifications/{id}/read", patch(mark_read))
        .route("/api/preferences", get(get_preferences).patch(update_preferences))
        .with_state(state);

    match frontend_origin.parse::<HeaderValue>() {
        Ok(origin) => {
            let cors = CorsLayer::new()
                .allow_origin(origin)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE]);
            app = app.layer(cors);
        }
        Err(e) => {
            tracing::warn!(origin = %frontend_origin, error = %e, "invalid CORS origin, skipping CORS layer");
        }
    }
    app
}

/// Liveness probe.
async fn health() -> &'static str {
    "ok"
}

// ---------------------------------------------------------------------------
// Task routes
// ---------------------------------------------------------------------------

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(query): Query<TaskListQuery>,
) -> Json<Vec<TaskView>> {
    let project = query
        .project_id
        .as_deref()
        .filter(|p| *p != "all");
    Json(tasks::list(&state, &ctx, project).await)
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(draft): Json<TaskDraft>,
) -> Result<(StatusCode, Json<TaskView>), ApiError> {
    ctx.require_role(&[Role::Admin, Role::Manager])?;
    let view = tasks::create(&state, &ctx, draft).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<TaskView>, ApiError> {
    ctx.require_role(&[Role::Admin, Role::Manager])?;
    let view = tasks::update(&state, &ctx, TaskId::from_uuid(id), patch).await?;
    Ok(Json(view))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ctx.require_role(&[Role::Admin])?;
    tasks::delete(&state, &ctx, TaskId::from_uuid(id)).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

// ---------------------------------------------------------------------------
// Notification routes
// ---------------------------------------------------------------------------

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Json<Vec<Notification>> {
    Json(state.notifications.list_for(&ctx.user_id).await)
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.notifications.mark_read(&ctx.user_id, id).await {
        Ok(Json(serde_json::json!({ "success": true })))
    } else {
        Err(ApiError::NotFound)
    }
}

async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Json<serde_json::Value> {
    let updated = state.notifications.mark_all_read(&ctx.user_id).await;
    Json(serde_json::json!({ "success": true, "updated": updated }))
}

async fn delete_notification(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.notifications.remove(&ctx.user_id, id).await {
        Ok(Json(serde_json::json!({ "success": true })))
    } else {
        Err(ApiError::NotFound)
    }
}

// ---------------------------------------------------------------------------
// Preference routes
// ---------------------------------------------------------------------------

async fn get_preferences(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Json<NotificationPreference> {
    Json(state.preferences.get_or_default(&ctx.user_id).await)
}

async fn update_preferences(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(patch): Json<PreferencePatch>,
) -> Json<NotificationPreference> {
    Json(state.preferences.merge(&ctx.user_id, patch).await)
}

// ---------------------------------------------------------------------------
// Server entry points
// ---------------------------------------------------------------------------

/// Starts the server on the given address and returns the bound address and
/// a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
    state: Arc<AppState>,
    frontend_origin: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state, frontend_origin);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}
