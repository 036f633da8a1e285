//! Live WebSocket tests against an in-process server: cookie handshake
//! authentication, room joins, and broadcast delivery over real sockets.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use cloudboard_proto::event::{ServerEvent, decode_server};
use cloudboard_server::auth::AuthContext;
use cloudboard_server::config::ServerConfig;
use cloudboard_server::models::{Role, TaskDraft, TaskPatch, User};
use cloudboard_server::rest;
use cloudboard_server::state::AppState;
use cloudboard_server::tasks;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Starts the server on an OS-assigned port with two tenants provisioned.
async fn start_test_server() -> (std::net::SocketAddr, Arc<AppState>) {
    let state = Arc::new(AppState::new(&ServerConfig::default()));
    for (id, org) in [("u1", "org1"), ("u42", "org1"), ("intruder", "org2")] {
        state
            .users
            .insert(User {
                id: id.to_string(),
                email: format!("{id}@example.com"),
                name: id.to_string(),
                org_id: org.to_string(),
                role: Role::Admin,
            })
            .await;
    }
    let (addr, _handle) = rest::start_server("127.0.0.1:0", Arc::clone(&state), "http://localhost:5173")
        .await
        .expect("failed to start test server");
    (addr, state)
}

/// Connects a WebSocket client presenting the given cookie header value.
async fn connect_with_cookie(
    addr: std::net::SocketAddr,
    cookie: &str,
) -> Result<WsClient, tungstenite::Error> {
    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Cookie", cookie.parse().unwrap());
    let (ws, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(ws)
}

/// Connects and authenticates as an existing user.
async fn connect_as(addr: std::net::SocketAddr, state: &AppState, user_id: &str) -> WsClient {
    let token = state.issue_session(user_id).unwrap();
    connect_with_cookie(addr, &format!("token={token}"))
        .await
        .expect("handshake should succeed")
}

/// Sends a `join-org` event and waits until the server has processed it.
async fn join_org(ws: &mut WsClient, state: &AppState, org_id: &str, expected_members: usize) {
    let frame = format!(r#"{{"event":"join-org","data":"{org_id}"}}"#);
    ws.send(tungstenite::Message::Text(frame.into()))
        .await
        .unwrap();
    for _ in 0..100 {
        if state.gateway.room_size(org_id).await >= expected_members {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("room {org_id} never reached {expected_members} members");
}

/// Receives the next server event from a socket.
async fn recv_event(ws: &mut WsClient) -> ServerEvent {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for event")
        .expect("stream ended")
        .expect("websocket error");
    let text = msg.into_text().unwrap();
    decode_server(&text).unwrap()
}

/// Asserts no frame arrives within a grace window.
async fn assert_silent(ws: &mut WsClient) {
    let result = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "expected no frame, got {result:?}");
}

fn admin_ctx(user_id: &str, org_id: &str) -> AuthContext {
    AuthContext {
        user_id: user_id.to_string(),
        org_id: org_id.to_string(),
        role: Role::Admin,
    }
}

// ---------------------------------------------------------------------------
// Handshake authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handshake_without_cookie_is_rejected() {
    let (addr, _state) = start_test_server().await;
    let request = format!("ws://{addr}/ws").into_client_request().unwrap();
    let result = tokio_tungstenite::connect_async(request).await;
    assert!(result.is_err(), "connection must not reach the open state");
}

#[tokio::test]
async fn handshake_with_garbage_token_is_rejected() {
    let (addr, _state) = start_test_server().await;
    assert!(connect_with_cookie(addr, "token=not-a-real-token").await.is_err());
}

#[tokio::test]
async fn handshake_with_unknown_user_is_rejected() {
    let (addr, state) = start_test_server().await;
    let token = state.issue_session("ghost").unwrap();
    assert!(connect_with_cookie(addr, &format!("token={token}")).await.is_err());
}

#[tokio::test]
async fn handshake_with_valid_cookie_opens() {
    let (addr, state) = start_test_server().await;
    let _ws = connect_as(addr, &state, "u1").await;
}

// ---------------------------------------------------------------------------
// Rooms and broadcast
// ---------------------------------------------------------------------------

#[tokio::test]
async fn org_room_receives_task_lifecycle_events() {
    let (addr, state) = start_test_server().await;
    let mut ws = connect_as(addr, &state, "u1").await;
    join_org(&mut ws, &state, "org1", 1).await;

    let ctx = admin_ctx("u1", "org1");
    let created = tasks::create(
        &state,
        &ctx,
        TaskDraft {
            title: "Write spec".to_string(),
            project_id: "p1".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    match recv_event(&mut ws).await {
        ServerEvent::TaskCreated(view) => assert_eq!(view.id, created.id),
        other => panic!("expected task-created, got {other:?}"),
    }

    tasks::delete(&state, &ctx, created.id).await.unwrap();
    match recv_event(&mut ws).await {
        ServerEvent::TaskDeleted { id } => assert_eq!(id, created.id),
        other => panic!("expected task-deleted, got {other:?}"),
    }
}

#[tokio::test]
async fn foreign_org_join_is_silently_ignored() {
    let (addr, state) = start_test_server().await;
    let mut member = connect_as(addr, &state, "u1").await;
    join_org(&mut member, &state, "org1", 1).await;

    // The intruder (org2) asks for org1's room; no error frame comes back
    // and no broadcast ever arrives.
    let mut intruder = connect_as(addr, &state, "intruder").await;
    intruder
        .send(tungstenite::Message::Text(
            r#"{"event":"join-org","data":"org1"}"#.into(),
        ))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.gateway.room_size("org1").await, 1);

    tasks::create(
        &state,
        &admin_ctx("u1", "org1"),
        TaskDraft {
            title: "secret".to_string(),
            project_id: "p1".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(matches!(
        recv_event(&mut member).await,
        ServerEvent::TaskCreated(_)
    ));
    assert_silent(&mut intruder).await;
}

#[tokio::test]
async fn assignee_gets_private_notification_without_joining() {
    let (addr, state) = start_test_server().await;
    let mut assignee = connect_as(addr, &state, "u42").await;
    // No join-org: the private user room is implicit at handshake.

    let ctx = admin_ctx("u1", "org1");
    let created = tasks::create(
        &state,
        &ctx,
        TaskDraft {
            title: "Paint the shed".to_string(),
            project_id: "p1".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let patch: TaskPatch = serde_json::from_str(r#"{"assignee_id": "u42"}"#).unwrap();
    tasks::update(&state, &ctx, created.id, patch).await.unwrap();

    match recv_event(&mut assignee).await {
        ServerEvent::Notification { title, message, .. } => {
            assert_eq!(title, "New Task Assigned");
            assert_eq!(message, "You have been assigned: Paint the shed");
        }
        other => panic!("expected notification, got {other:?}"),
    }
    // The org-room task-updated broadcast did not leak to the un-joined socket.
    assert_silent(&mut assignee).await;
}

#[tokio::test]
async fn disconnect_prunes_room_membership() {
    let (addr, state) = start_test_server().await;
    let mut ws = connect_as(addr, &state, "u1").await;
    join_org(&mut ws, &state, "org1", 1).await;
    assert_eq!(state.gateway.room_size("u1").await, 1);

    ws.close(None).await.unwrap();
    drop(ws);
    for _ in 0..100 {
        if state.gateway.room_size("org1").await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.gateway.room_size("org1").await, 0);
    assert_eq!(state.gateway.room_size("u1").await, 0);
}

#[tokio::test]
async fn repeat_join_delivers_each_broadcast_once() {
    let (addr, state) = start_test_server().await;
    let mut ws = connect_as(addr, &state, "u1").await;
    join_org(&mut ws, &state, "org1", 1).await;
    // Second join is a no-op.
    ws.send(tungstenite::Message::Text(
        r#"{"event":"join-org","data":"org1"}"#.into(),
    ))
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.gateway.room_size("org1").await, 1);

    tasks::create(
        &state,
        &admin_ctx("u1", "org1"),
        TaskDraft {
            title: "once".to_string(),
            project_id: "p1".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(matches!(
        recv_event(&mut ws).await,
        ServerEvent::TaskCreated(_)
    ));
    assert_silent(&mut ws).await;
}
