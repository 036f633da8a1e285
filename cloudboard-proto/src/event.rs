//! Real-time event types for the CloudBoard WebSocket channel.
//!
//! Events travel as JSON text frames shaped as `{"event": "...", "data": ...}`
//! so browser clients can dispatch on the `event` name. [`ClientEvent`] is
//! what clients may send after the handshake; [`ServerEvent`] is what the
//! gateway broadcasts into rooms.

use serde::{Deserialize, Serialize};

use crate::task::{TaskId, TaskView};

/// Category of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A task was assigned to the recipient.
    TaskAssignment,
    /// A pending request was approved.
    Approval,
    /// A pending request was rejected.
    Rejection,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskAssignment => write!(f, "task_assignment"),
            Self::Approval => write!(f, "approval"),
            Self::Rejection => write!(f, "rejection"),
        }
    }
}

/// Events a client may send to the server after the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Request to join the broadcast room of the given organization.
    ///
    /// The server only honors this when the id matches the connection's
    /// authenticated organization; mismatches are dropped silently.
    JoinOrg(String),
}

/// Events the server broadcasts into rooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// A task was created; sent to the organization room.
    TaskCreated(TaskView),
    /// A task was updated; sent to the organization room.
    TaskUpdated(TaskView),
    /// A task was deleted; sent to the organization room.
    TaskDeleted {
        /// Identifier of the removed task.
        id: TaskId,
    },
    /// A notification for one user; sent only to that user's private room.
    Notification {
        /// Notification category.
        #[serde(rename = "type")]
        kind: NotificationKind,
        /// Short headline.
        title: String,
        /// Human-readable body.
        message: String,
    },
}

/// Encodes a [`ServerEvent`] into a JSON text frame.
///
/// # Errors
///
/// Returns an error string if serialization fails.
pub fn encode(event: &ServerEvent) -> Result<String, String> {
    serde_json::to_string(event).map_err(|e| format!("event encode error: {e}"))
}

/// Decodes a [`ClientEvent`] from a JSON text frame.
///
/// # Errors
///
/// Returns an error string if the frame is not a known client event.
pub fn decode_client(text: &str) -> Result<ClientEvent, String> {
    serde_json::from_str(text).map_err(|e| format!("event decode error: {e}"))
}

/// Decodes a [`ServerEvent`] from a JSON text frame (used by test clients).
///
/// # Errors
///
/// Returns an error string if the frame is not a known server event.
pub fn decode_server(text: &str) -> Result<ServerEvent, String> {
    serde_json::from_str(text).map_err(|e| format!("event decode error: {e}"))
}
