//! Task mutation service: validate, persist, broadcast, notify — in that
//! order.
//!
//! The store write completes before any broadcast or notification is
//! attempted, so a room event never announces state that was not committed.
//! Side effects after the write are best-effort and can only be observed in
//! the log; the caller's response is decided by the write alone. Concurrent
//! updates to one task are last-write-wins with no conflict signal.

use cloudboard_proto::event::ServerEvent;
use cloudboard_proto::task::{TaskId, TaskView};

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::models::{Task, TaskDraft, TaskPatch};
use crate::notify;
use crate::state::AppState;

/// Lists the tenant's tasks, optionally narrowed to one project,
/// newest-created first. No side effects.
pub async fn list(state: &AppState, ctx: &AuthContext, project_id: Option<&str>) -> Vec<TaskView> {
    state
        .tasks
        .list(&ctx.org_id, project_id)
        .await
        .iter()
        .map(Task::view)
        .collect()
}

/// Creates a task for the caller's tenant.
///
/// On success the full projection is broadcast as `task-created` to the
/// organization room, and if the draft assigned someone, the dispatcher
/// runs for that assignee.
///
/// # Errors
///
/// Returns [`ApiError::Validation`] when the title is empty.
pub async fn create(
    state: &AppState,
    ctx: &AuthContext,
    draft: TaskDraft,
) -> Result<TaskView, ApiError> {
    if draft.title.trim().is_empty() {
        return Err(ApiError::Validation("title is required".to_string()));
    }

    let task = Task::from_draft(&ctx.org_id, &ctx.user_id, draft);
    state.tasks.insert(task.clone()).await;
    tracing::info!(task_id = %task.id, org_id = %ctx.org_id, "task created");

    let view = task.view();
    state
        .gateway
        .broadcast(&ctx.org_id, &ServerEvent::TaskCreated(view.clone()))
        .await;

    if let Some(assignee_id) = task.assignee_id.clone() {
        notify::notify_assigned(state, &assignee_id, &ctx.org_id, &task).await;
    }

    Ok(view)
}

/// Applies a patch to an existing task in the caller's tenant.
///
/// Broadcasts `task-updated` after the write. The dispatcher runs only
/// when the patch moved the assignment to a new, non-empty assignee:
/// re-assigning to the same user or clearing the assignee notifies no one.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] when the task is absent or belongs to
/// another tenant, [`ApiError::Validation`] when the patch empties the
/// title.
pub async fn update(
    state: &AppState,
    ctx: &AuthContext,
    id: TaskId,
    patch: TaskPatch,
) -> Result<TaskView, ApiError> {
    if patch.title.as_ref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::Validation("title is required".to_string()));
    }

    let mut task = state
        .tasks
        .get(&ctx.org_id, id)
        .await
        .ok_or(ApiError::NotFound)?;

    let previous_assignee = task.assignee_id.clone();
    task.apply(patch);
    state.tasks.replace(task.clone()).await;
    tracing::info!(task_id = %task.id, org_id = %ctx.org_id, "task updated");

    let view = task.view();
    state
        .gateway
        .broadcast(&ctx.org_id, &ServerEvent::TaskUpdated(view.clone()))
        .await;

    if let Some(assignee_id) = task.assignee_id.clone()
        && previous_assignee.as_deref() != Some(&assignee_id)
    {
        notify::notify_assigned(state, &assignee_id, &ctx.org_id, &task).await;
    }

    Ok(view)
}

/// Deletes a task from the caller's tenant and broadcasts `task-deleted`
/// with just the id. No notification side effect.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] when the task is absent or belongs to
/// another tenant.
pub async fn delete(state: &AppState, ctx: &AuthContext, id: TaskId) -> Result<(), ApiError> {
    state
        .tasks
        .remove(&ctx.org_id, id)
        .await
        .ok_or(ApiError::NotFound)?;
    tracing::info!(task_id = %id, org_id = %ctx.org_id, "task deleted");

    state
        .gateway
        .broadcast(&ctx.org_id, &ServerEvent::TaskDeleted { id })
        .await;
    Ok(())
}
