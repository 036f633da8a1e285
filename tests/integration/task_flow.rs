//! End-to-end mutation scenarios: create, assign, update, delete, and the
//! notification fan-out they drive, observed through attached gateway
//! connections and a recording mailer.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use cloudboard_proto::event::{NotificationKind, ServerEvent, decode_server};
use cloudboard_proto::task::{TaskPriority, TaskStatus};
use cloudboard_server::auth::AuthContext;
use cloudboard_server::config::ServerConfig;
use cloudboard_server::gateway::handle_client_event;
use cloudboard_server::models::{PreferencePatch, Role, TaskDraft, TaskPatch, User};
use cloudboard_server::notify::RecordingMailer;
use cloudboard_server::state::AppState;
use cloudboard_server::tasks;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

async fn make_state() -> (Arc<AppState>, Arc<RecordingMailer>) {
    let mailer = Arc::new(RecordingMailer::new());
    let state =
        Arc::new(AppState::new(&ServerConfig::default()).with_mailer(Arc::clone(&mailer) as _));
    for (id, org, role) in [
        ("u1", "org1", Role::Admin),
        ("u42", "org1", Role::Member),
        ("intruder", "org2", Role::Admin),
    ] {
        state
            .users
            .insert(User {
                id: id.to_string(),
                email: format!("{id}@example.com"),
                name: id.to_string(),
                org_id: org.to_string(),
                role,
            })
            .await;
    }
    (state, mailer)
}

fn make_ctx(user_id: &str, org_id: &str, role: Role) -> AuthContext {
    AuthContext {
        user_id: user_id.to_string(),
        org_id: org_id.to_string(),
        role,
    }
}

/// Attaches a bare connection for `user_id` and drives a `join-org` event
/// through the authorization path, as a live socket would.
async fn attach_and_join(
    state: &Arc<AppState>,
    user_id: &str,
    org_id: &str,
    requested_room: &str,
) -> mpsc::UnboundedReceiver<axum::extract::ws::Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    let conn = state.gateway.connect(tx, user_id).await;
    let ctx = make_ctx(user_id, org_id, Role::Member);
    let frame = format!(r#"{{"event":"join-org","data":"{requested_room}"}}"#);
    handle_client_event(conn, &frame, state, &ctx).await;
    rx
}

fn next_event(rx: &mut mpsc::UnboundedReceiver<axum::extract::ws::Message>) -> ServerEvent {
    let msg = rx.try_recv().expect("expected a frame");
    let axum::extract::ws::Message::Text(text) = msg else {
        panic!("expected text frame, got {msg:?}");
    };
    decode_server(&text).unwrap()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_assign_delete_walkthrough() {
    let (state, mailer) = make_state().await;
    let admin = make_ctx("u1", "org1", Role::Admin);
    let mut org_rx = attach_and_join(&state, "u1", "org1", "org1").await;
    // The assignee's own connection; reachable at its user room without a join.
    let (assignee_tx, mut assignee_rx) = mpsc::unbounded_channel();
    state.gateway.connect(assignee_tx, "u42").await;

    // Create with no assignee: broadcast with defaults, zero notifications.
    let created = tasks::create(
        &state,
        &admin,
        TaskDraft {
            title: "Write spec".to_string(),
            project_id: "p1".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    match next_event(&mut org_rx) {
        ServerEvent::TaskCreated(view) => {
            assert_eq!(view.title, "Write spec");
            assert_eq!(view.status, TaskStatus::Todo);
            assert_eq!(view.priority, TaskPriority::Medium);
            assert!(view.assignee_id.is_none());
        }
        other => panic!("expected task-created, got {other:?}"),
    }
    assert_eq!(state.notifications.count_for("u42").await, 0);
    assert!(assignee_rx.try_recv().is_err());

    // Assign to u42: task-updated on the org room, one notification record,
    // one live event on u42's private room, one email.
    let patch: TaskPatch = serde_json::from_str(r#"{"assignee_id": "u42"}"#).unwrap();
    tasks::update(&state, &admin, created.id, patch).await.unwrap();

    match next_event(&mut org_rx) {
        ServerEvent::TaskUpdated(view) => assert_eq!(view.assignee_id.as_deref(), Some("u42")),
        other => panic!("expected task-updated, got {other:?}"),
    }
    let stored = state.notifications.list_for("u42").await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].kind, NotificationKind::TaskAssignment);
    match next_event(&mut assignee_rx) {
        ServerEvent::Notification { kind, title, message } => {
            assert_eq!(kind, NotificationKind::TaskAssignment);
            assert_eq!(title, "New Task Assigned");
            assert_eq!(message, "You have been assigned: Write spec");
        }
        other => panic!("expected notification, got {other:?}"),
    }
    assert_eq!(mailer.sent().await.len(), 1);
    // The org-wide update never leaks into the private user room.
    assert!(assignee_rx.try_recv().is_err());

    // Delete: id-only broadcast, gone from the listing.
    tasks::delete(&state, &admin, created.id).await.unwrap();
    match next_event(&mut org_rx) {
        ServerEvent::TaskDeleted { id } => assert_eq!(id, created.id),
        other => panic!("expected task-deleted, got {other:?}"),
    }
    assert!(tasks::list(&state, &admin, None).await.is_empty());
}

#[tokio::test]
async fn foreign_org_join_receives_no_broadcasts() {
    let (state, _mailer) = make_state().await;
    // Intruder from org2 asks for org1's room; the join is dropped.
    let mut intruder_rx = attach_and_join(&state, "intruder", "org2", "org1").await;
    let mut member_rx = attach_and_join(&state, "u1", "org1", "org1").await;

    tasks::create(
        &state,
        &make_ctx("u1", "org1", Role::Admin),
        TaskDraft {
            title: "secret roadmap".to_string(),
            project_id: "p1".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(matches!(
        next_event(&mut member_rx),
        ServerEvent::TaskCreated(_)
    ));
    assert!(intruder_rx.try_recv().is_err());
}

#[tokio::test]
async fn tenant_isolation_returns_not_found() {
    let (state, _mailer) = make_state().await;
    let created = tasks::create(
        &state,
        &make_ctx("u1", "org1", Role::Admin),
        TaskDraft {
            title: "ours".to_string(),
            project_id: "p1".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let foreign = make_ctx("intruder", "org2", Role::Admin);
    assert!(tasks::update(&state, &foreign, created.id, TaskPatch::default())
        .await
        .is_err());
    assert!(tasks::delete(&state, &foreign, created.id).await.is_err());
    assert!(tasks::list(&state, &foreign, None).await.is_empty());
    // And the record is untouched for its own tenant.
    assert_eq!(
        tasks::list(&state, &make_ctx("u1", "org1", Role::Admin), None)
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn email_gated_by_both_preference_flags() {
    let (state, mailer) = make_state().await;
    let admin = make_ctx("u1", "org1", Role::Admin);

    // emailNotifications off, taskAssignments on: record + live event, no email.
    state
        .preferences
        .merge(
            "u42",
            PreferencePatch {
                email_notifications: Some(false),
                ..Default::default()
            },
        )
        .await;
    let created = tasks::create(
        &state,
        &admin,
        TaskDraft {
            title: "a".to_string(),
            project_id: "p1".to_string(),
            assignee_id: Some("u42".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(state.notifications.count_for("u42").await, 1);
    assert!(mailer.sent().await.is_empty());

    // emailNotifications on, taskAssignments off: still no email.
    state
        .preferences
        .merge(
            "u42",
            PreferencePatch {
                email_notifications: Some(true),
                task_assignments: Some(false),
                ..Default::default()
            },
        )
        .await;
    let patch: TaskPatch = serde_json::from_str(r#"{"assignee_id": null}"#).unwrap();
    tasks::update(&state, &admin, created.id, patch).await.unwrap();
    let patch: TaskPatch = serde_json::from_str(r#"{"assignee_id": "u42"}"#).unwrap();
    tasks::update(&state, &admin, created.id, patch).await.unwrap();
    assert_eq!(state.notifications.count_for("u42").await, 2);
    assert!(mailer.sent().await.is_empty());
}

#[tokio::test]
async fn unread_log_flows_through_read_actions() {
    let (state, _mailer) = make_state().await;
    let admin = make_ctx("u1", "org1", Role::Admin);
    for title in ["a", "b"] {
        tasks::create(
            &state,
            &admin,
            TaskDraft {
                title: title.to_string(),
                project_id: "p1".to_string(),
                assignee_id: Some("u42".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    }

    let listed = state.notifications.list_for("u42").await;
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|n| !n.read));

    assert!(state.notifications.mark_read("u42", listed[0].id).await);
    assert_eq!(state.notifications.mark_all_read("u42").await, 1);
    assert!(state
        .notifications
        .list_for("u42")
        .await
        .iter()
        .all(|n| n.read));

    assert!(state.notifications.remove("u42", listed[0].id).await);
    assert_eq!(state.notifications.count_for("u42").await, 1);
}
