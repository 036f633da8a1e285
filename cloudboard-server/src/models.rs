//! Domain records held by the in-memory stores, plus the request bodies
//! that mutate them.
//!
//! The wire-facing task projection lives in `cloudboard-proto`; the records
//! here carry the extra server-side fields (tenant key, creator) that never
//! leave the process.

use chrono::{DateTime, Utc};
use cloudboard_proto::event::NotificationKind;
use cloudboard_proto::task::{TaskId, TaskPriority, TaskStatus, TaskView};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Role of a user inside its organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full control, including task deletion.
    Admin,
    /// Can create and update tasks.
    Manager,
    /// Read-only on the task board.
    Member,
}

/// A provisioned user account.
///
/// Account creation and password/OTP flows are handled by the external auth
/// service; the gateway and dispatcher only need this lookup record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Opaque user identifier.
    pub id: String,
    /// Delivery address for email notifications.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Tenant the user belongs to.
    pub org_id: String,
    /// Role within the organization.
    pub role: Role,
}

/// A persisted task record. The `org_id` is the tenant partition key and is
/// immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Task identifier.
    pub id: TaskId,
    /// Tenant partition key.
    pub org_id: String,
    /// Project the task belongs to.
    pub project_id: String,
    /// Task title (never empty).
    pub title: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Kanban column.
    pub status: TaskStatus,
    /// Priority level.
    pub priority: TaskPriority,
    /// Assigned user, if any.
    pub assignee_id: Option<String>,
    /// User who created the task.
    pub created_by: String,
    /// Optional due date.
    pub due_date: Option<DateTime<Utc>>,
    /// Ordered label list.
    pub tags: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Builds a new record from a create request, stamping in the tenant
    /// and creator from the authenticated session.
    #[must_use]
    pub fn from_draft(org_id: &str, created_by: &str, draft: TaskDraft) -> Self {
        Self {
            id: TaskId::new(),
            org_id: org_id.to_string(),
            project_id: draft.project_id,
            title: draft.title,
            description: draft.description,
            status: draft.status,
            priority: draft.priority,
            assignee_id: draft.assignee_id,
            created_by: created_by.to_string(),
            due_date: draft.due_date,
            tags: draft.tags,
            created_at: Utc::now(),
        }
    }

    /// Applies a patch in place. Absent fields are left untouched; fields
    /// sent as explicit `null` are cleared. `org_id`, `created_by`, and
    /// `created_at` are never patchable.
    pub fn apply(&mut self, patch: TaskPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(project_id) = patch.project_id {
            self.project_id = project_id;
        }
        if let Some(assignee_id) = patch.assignee_id {
            self.assignee_id = assignee_id;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
    }

    /// Client-facing projection of this record.
    #[must_use]
    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            status: self.status,
            priority: self.priority,
            project_id: self.project_id.clone(),
            assignee_id: self.assignee_id.clone(),
            due_date: self.due_date,
            tags: self.tags.clone(),
            created_at: self.created_at,
        }
    }
}

/// JSON body for task creation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskDraft {
    /// Required title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Initial column, defaults to `todo`.
    pub status: TaskStatus,
    /// Initial priority, defaults to `medium`.
    pub priority: TaskPriority,
    /// Project the task belongs to.
    pub project_id: String,
    /// Initial assignee, if any.
    pub assignee_id: Option<String>,
    /// Optional due date.
    pub due_date: Option<DateTime<Utc>>,
    /// Label list.
    pub tags: Vec<String>,
}

/// JSON body for task updates. Every field distinguishes "absent" (leave
/// unchanged) from explicit `null` (clear) where clearing makes sense.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description; `null` clears it.
    #[serde(deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    /// New column.
    pub status: Option<TaskStatus>,
    /// New priority.
    pub priority: Option<TaskPriority>,
    /// Move to a different project.
    pub project_id: Option<String>,
    /// New assignee; `null` clears the assignment.
    #[serde(deserialize_with = "double_option")]
    pub assignee_id: Option<Option<String>>,
    /// New due date; `null` clears it.
    #[serde(deserialize_with = "double_option")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    /// Replacement label list.
    pub tags: Option<Vec<String>>,
}

/// Deserializes a present-but-possibly-null field as `Some(inner)`, so an
/// absent field (via `#[serde(default)]`) stays `None` while an explicit
/// `null` becomes `Some(None)`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A stored in-app notification. The `read` flag only ever transitions
/// false to true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Notification identifier.
    pub id: Uuid,
    /// Recipient user.
    pub user_id: String,
    /// Tenant the notification was raised in.
    pub org_id: String,
    /// Notification category.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Short headline.
    pub title: String,
    /// Human-readable body.
    pub message: String,
    /// Whether the recipient has seen it.
    pub read: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Creates an unread notification stamped with the current time.
    #[must_use]
    pub fn new(
        user_id: &str,
        org_id: &str,
        kind: NotificationKind,
        title: &str,
        message: &str,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            org_id: org_id.to_string(),
            kind,
            title: title.to_string(),
            message: message.to_string(),
            read: false,
            created_at: Utc::now(),
        }
    }
}

/// Per-user notification delivery preferences. All channels default to on;
/// the record is created lazily on first access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotificationPreference {
    /// Send emails for enabled notification categories.
    pub email_notifications: bool,
    /// Client-side browser push prompt opt-in. Does not gate server-side
    /// live emission.
    pub push_notifications: bool,
    /// Notify on task assignment.
    pub task_assignments: bool,
    /// Notify on mentions.
    pub mentions: bool,
}

impl Default for NotificationPreference {
    fn default() -> Self {
        Self {
            email_notifications: true,
            push_notifications: true,
            task_assignments: true,
            mentions: true,
        }
    }
}

impl NotificationPreference {
    /// Merges provided fields from a preference update.
    pub fn merge(&mut self, patch: PreferencePatch) {
        if let Some(v) = patch.email_notifications {
            self.email_notifications = v;
        }
        if let Some(v) = patch.push_notifications {
            self.push_notifications = v;
        }
        if let Some(v) = patch.task_assignments {
            self.task_assignments = v;
        }
        if let Some(v) = patch.mentions {
            self.mentions = v;
        }
    }
}

/// JSON body for preference updates; absent fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct PreferencePatch {
    /// New email toggle.
    pub email_notifications: Option<bool>,
    /// New push-prompt toggle.
    pub push_notifications: Option<bool>,
    /// New task-assignment toggle.
    pub task_assignments: Option<bool>,
    /// New mentions toggle.
    pub mentions: Option<bool>,
}
