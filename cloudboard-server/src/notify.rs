//! Notification dispatcher: fans a task-assignment event out to the in-app
//! log, the live channel, and email, under a single preference check.
//!
//! Everything here runs after the task mutation has already been persisted
//! and acknowledged, so nothing may fail the enclosing request: lookup
//! misses abort silently, email failures are logged and dropped, and each
//! channel is attempted at most once per assignment event.

use async_trait::async_trait;
use cloudboard_proto::event::{NotificationKind, ServerEvent};

use crate::models::{Notification, Task};
use crate::state::AppState;

/// Headline used for every task-assignment notification.
const ASSIGNMENT_TITLE: &str = "New Task Assigned";

/// Outbound email delivery at its contract boundary: best-effort, one
/// attempt, failure never propagates past the dispatcher.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Sends one HTML email.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason on delivery failure; the dispatcher
    /// logs it and moves on.
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), String>;
}

/// Production stand-in for the external mail provider: records the send in
/// the log and reports success.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send(&self, to: &str, subject: &str, _html: &str) -> Result<(), String> {
        tracing::info!(to = %to, subject = %subject, "email dispatched");
        Ok(())
    }
}

/// One captured outbound email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
}

/// Test double that records every send instead of delivering.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: tokio::sync::Mutex<Vec<SentEmail>>,
}

impl RecordingMailer {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every email sent so far.
    pub async fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), String> {
        self.sent.lock().await.push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
        });
        Ok(())
    }
}

/// Fans out one task-assignment event for `assignee_id`.
///
/// The in-app record and the live event are unconditional — preferences
/// gate delivery channels, not record-keeping, and the `push_notifications`
/// flag governs the client's browser prompt rather than server emission.
/// Email requires both `email_notifications` and `task_assignments`.
pub async fn notify_assigned(state: &AppState, assignee_id: &str, org_id: &str, task: &Task) {
    let Some(user) = state.users.get(assignee_id).await else {
        // Assignment pointed at a deleted or unknown user; not an error.
        tracing::debug!(assignee_id = %assignee_id, "assignee not found, skipping notification");
        return;
    };

    let prefs = state.preferences.get_or_default(assignee_id).await;
    let message = format!("You have been assigned: {}", task.title);

    state
        .notifications
        .append(Notification::new(
            assignee_id,
            org_id,
            NotificationKind::TaskAssignment,
            ASSIGNMENT_TITLE,
            &message,
        ))
        .await;

    state
        .gateway
        .broadcast(
            assignee_id,
            &ServerEvent::Notification {
                kind: NotificationKind::TaskAssignment,
                title: ASSIGNMENT_TITLE.to_string(),
                message: message.clone(),
            },
        )
        .await;

    if prefs.email_notifications && prefs.task_assignments {
        let html = format!(
            "<h2>New Task Assigned</h2>\
             <p>You have been assigned a new task:</p>\
             <strong>{}</strong>\
             <p>{}</p>",
            task.title,
            task.description.as_deref().unwrap_or_default()
        );
        if let Err(e) = state
            .mailer
            .send(&user.email, "New Task Assigned - CloudBoard", &html)
            .await
        {
            tracing::warn!(to = %user.email, error = %e, "assignment email failed");
        }
    }
}
