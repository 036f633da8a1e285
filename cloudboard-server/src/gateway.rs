//! Realtime gateway: connection registry, room membership, and broadcast.
//!
//! Each browser client holds one WebSocket connection. The HTTP upgrade is
//! authenticated from the session cookie before the socket ever opens; an
//! authenticated connection is immediately reachable at its private user
//! room and may additionally join its own organization's broadcast room via
//! a `join-org` event. Broadcast delivery is best-effort: no acks, no
//! retries, no queueing for absent members — clients reconcile through the
//! REST list endpoints on reconnect.
//!
//! The [`Gateway`] is a single shared instance injected through `AppState`
//! into every handler that broadcasts, so a broadcast without a registry is
//! unrepresentable rather than a runtime fatal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use cloudboard_proto::event::{self, ClientEvent, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc};

use crate::auth::{self, AuthContext};
use crate::error::ApiError;
use crate::state::AppState;

/// Identifier for one live connection, unique per process.
pub type ConnId = u64;

/// Bookkeeping for one live connection.
struct ConnEntry {
    sender: mpsc::UnboundedSender<Message>,
    rooms: HashSet<String>,
}

/// Room membership maps. One lock guards both directions so they can never
/// disagree.
#[derive(Default)]
struct Registry {
    conns: HashMap<ConnId, ConnEntry>,
    rooms: HashMap<String, HashSet<ConnId>>,
}

/// Process-wide index from room id to the set of live connections.
pub struct Gateway {
    inner: RwLock<Registry>,
    next_id: AtomicU64,
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway {
    /// Creates an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Registry::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a connection and joins it to its private user room.
    ///
    /// The user room needs no explicit join because it is derived from the
    /// already-verified session, not from client input.
    pub async fn connect(&self, sender: mpsc::UnboundedSender<Message>, user_id: &str) -> ConnId {
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.inner.write().await;
        registry.conns.insert(
            conn_id,
            ConnEntry {
                sender,
                rooms: HashSet::new(),
            },
        );
        Self::join_locked(&mut registry, conn_id, user_id);
        drop(registry);
        conn_id
    }

    /// Adds a connection to a room. Idempotent: rejoining an already-joined
    /// room is a no-op. Returns `false` for unknown connections or repeat
    /// joins.
    ///
    /// Authorization is the caller's concern; the socket handler only calls
    /// this after checking the room against the session's organization.
    pub async fn join(&self, conn_id: ConnId, room_id: &str) -> bool {
        let mut registry = self.inner.write().await;
        Self::join_locked(&mut registry, conn_id, room_id)
    }

    fn join_locked(registry: &mut Registry, conn_id: ConnId, room_id: &str) -> bool {
        let Some(entry) = registry.conns.get_mut(&conn_id) else {
            return false;
        };
        if !entry.rooms.insert(room_id.to_string()) {
            return false;
        }
        registry
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(conn_id);
        true
    }

    /// Removes a connection from every room and forgets it. No-op for
    /// already-removed connections.
    pub async fn disconnect(&self, conn_id: ConnId) {
        let mut registry = self.inner.write().await;
        let Some(entry) = registry.conns.remove(&conn_id) else {
            return;
        };
        for room_id in &entry.rooms {
            if let Some(members) = registry.rooms.get_mut(room_id) {
                members.remove(&conn_id);
                if members.is_empty() {
                    registry.rooms.remove(room_id);
                }
            }
        }
    }

    /// Delivers an event to every connection currently in `room_id`,
    /// exactly once per connection, best-effort. Returns how many
    /// connections accepted the frame.
    pub async fn broadcast(&self, room_id: &str, event: &ServerEvent) -> usize {
        let frame = match event::encode(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(room = %room_id, error = %e, "failed to encode broadcast event");
                return 0;
            }
        };

        let registry = self.inner.read().await;
        let Some(members) = registry.rooms.get(room_id) else {
            return 0;
        };

        let mut delivered = 0;
        for conn_id in members {
            let Some(entry) = registry.conns.get(conn_id) else {
                continue;
            };
            if entry.sender.send(Message::Text(frame.clone().into())).is_ok() {
                delivered += 1;
            } else {
                // Writer task already gone; disconnect cleanup will prune it.
                tracing::warn!(conn_id, room = %room_id, "dropping frame for closed connection");
            }
        }
        delivered
    }

    /// Number of connections currently in a room.
    pub async fn room_size(&self, room_id: &str) -> usize {
        let registry = self.inner.read().await;
        registry.rooms.get(room_id).map_or(0, HashSet::len)
    }
}

/// axum handler for `GET /ws`: authenticates the handshake from the session
/// cookie, then upgrades.
///
/// Rejection happens before the upgrade completes, so an unauthenticated
/// connection never reaches the open state and can never join a room.
pub async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    match auth::authenticate(&state, &headers).await {
        Ok(ctx) => ws.on_upgrade(move |socket| handle_socket(socket, state, ctx)),
        Err(e) => {
            tracing::warn!(error = %e, "websocket handshake rejected");
            ApiError::Unauthorized.into_response()
        }
    }
}

/// Drives one authenticated WebSocket connection to completion.
///
/// The connection lifecycle:
/// 1. Register with the gateway (auto-joins the private user room).
/// 2. Spawn a writer task forwarding broadcast frames to the socket.
/// 3. Read client events until the transport closes.
/// 4. Remove the connection from all rooms.
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, ctx: AuthContext) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let conn_id = state.gateway.connect(tx, &ctx.user_id).await;
    tracing::info!(
        conn_id,
        user_id = %ctx.user_id,
        org_id = %ctx.org_id,
        "client connected"
    );

    // Writer task: forwards frames from the gateway to the WebSocket.
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Reader loop: process client events until close.
    let reader_state = Arc::clone(&state);
    let reader_ctx = ctx.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_client_event(conn_id, &text, &reader_state, &reader_ctx).await;
                }
                Message::Close(_) => break,
                _ => {
                    // Ignore binary, ping, pong frames.
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.gateway.disconnect(conn_id).await;
    tracing::info!(conn_id, user_id = %ctx.user_id, "client disconnected");
}

/// Handles one text frame from an authenticated client.
///
/// A `join-org` for any organization other than the session's own is
/// dropped with a warning and no error frame, so a connection cannot probe
/// for foreign room ids.
pub async fn handle_client_event(conn_id: ConnId, text: &str, state: &AppState, ctx: &AuthContext) {
    let event = match event::decode_client(text) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(conn_id, error = %e, "ignoring undecodable client frame");
            return;
        }
    };

    match event {
        ClientEvent::JoinOrg(org_id) => {
            if org_id != ctx.org_id {
                tracing::warn!(
                    conn_id,
                    user_id = %ctx.user_id,
                    requested = %org_id,
                    "unauthorized room join attempt"
                );
                return;
            }
            if state.gateway.join(conn_id, &org_id).await {
                tracing::info!(conn_id, org_id = %org_id, "joined organization room");
            } else {
                tracing::debug!(conn_id, org_id = %org_id, "repeat join ignored");
            }
        }
    }
}
