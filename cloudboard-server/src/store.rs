//! In-memory persistence for tasks, notifications, preferences, and users.
//!
//! These stores stand in for the external document database at its contract
//! boundary: tenant-scoped CRUD with no broadcast logic. Every task accessor
//! takes the caller's organization id, and a record under another tenant
//! behaves exactly like an absent one.
//!
//! Thread-safe via [`RwLock`]; each store guards one map.

use std::collections::HashMap;

use cloudboard_proto::task::TaskId;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Notification, NotificationPreference, PreferencePatch, Task, User};

/// Maximum notifications returned by a list call, newest first.
const NOTIFICATION_PAGE_SIZE: usize = 20;

/// Tenant-scoped task collection.
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl TaskStore {
    /// Creates a new, empty task store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Persists a new task record.
    pub async fn insert(&self, task: Task) {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id, task);
    }

    /// Returns the task with the given id if it belongs to `org_id`.
    pub async fn get(&self, org_id: &str, id: TaskId) -> Option<Task> {
        let tasks = self.tasks.read().await;
        tasks.get(&id).filter(|t| t.org_id == org_id).cloned()
    }

    /// Replaces an existing record with an updated copy.
    pub async fn replace(&self, task: Task) {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id, task);
    }

    /// Removes the task with the given id if it belongs to `org_id`,
    /// returning the removed record.
    pub async fn remove(&self, org_id: &str, id: TaskId) -> Option<Task> {
        let mut tasks = self.tasks.write().await;
        if tasks.get(&id).is_some_and(|t| t.org_id == org_id) {
            tasks.remove(&id)
        } else {
            None
        }
    }

    /// Lists all tasks for a tenant, optionally narrowed to one project,
    /// newest-created first.
    pub async fn list(&self, org_id: &str, project_id: Option<&str>) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut result: Vec<Task> = tasks
            .values()
            .filter(|t| t.org_id == org_id)
            .filter(|t| project_id.is_none_or(|p| t.project_id == p))
            .cloned()
            .collect();
        // TaskIds are UUID v7, so the id tie-break keeps same-instant
        // creations in insertion order.
        result.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        result
    }
}

/// Append-only per-user notification log.
#[derive(Default)]
pub struct NotificationStore {
    entries: RwLock<HashMap<String, Vec<Notification>>>,
}

impl NotificationStore {
    /// Creates a new, empty notification store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a notification to its recipient's log.
    pub async fn append(&self, notification: Notification) {
        let mut entries = self.entries.write().await;
        entries
            .entry(notification.user_id.clone())
            .or_default()
            .push(notification);
    }

    /// Returns the recipient's most recent notifications, newest first,
    /// capped at a page.
    pub async fn list_for(&self, user_id: &str) -> Vec<Notification> {
        let entries = self.entries.read().await;
        let mut result = entries.get(user_id).cloned().unwrap_or_default();
        result.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        result.truncate(NOTIFICATION_PAGE_SIZE);
        result
    }

    /// Marks one of the recipient's notifications as read. The flag only
    /// moves false to true; re-marking is a no-op. Returns `false` when the
    /// notification does not exist for that user.
    pub async fn mark_read(&self, user_id: &str, id: Uuid) -> bool {
        let mut entries = self.entries.write().await;
        let Some(list) = entries.get_mut(user_id) else {
            return false;
        };
        match list.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = true;
                true
            }
            None => false,
        }
    }

    /// Marks all of the recipient's unread notifications as read, returning
    /// how many were flipped.
    pub async fn mark_all_read(&self, user_id: &str) -> usize {
        let mut entries = self.entries.write().await;
        let Some(list) = entries.get_mut(user_id) else {
            return 0;
        };
        let mut flipped = 0;
        for n in list.iter_mut().filter(|n| !n.read) {
            n.read = true;
            flipped += 1;
        }
        flipped
    }

    /// Deletes one of the recipient's notifications. Returns `false` when it
    /// does not exist for that user.
    pub async fn remove(&self, user_id: &str, id: Uuid) -> bool {
        let mut entries = self.entries.write().await;
        let Some(list) = entries.get_mut(user_id) else {
            return false;
        };
        let before = list.len();
        list.retain(|n| n.id != id);
        list.len() < before
    }

    /// Number of notifications stored for a user (unpaged).
    pub async fn count_for(&self, user_id: &str) -> usize {
        let entries = self.entries.read().await;
        entries.get(user_id).map_or(0, Vec::len)
    }
}

/// Per-user notification preference records, created lazily with all-true
/// defaults. At most one record exists per user (keyed map).
#[derive(Default)]
pub struct PreferenceStore {
    prefs: RwLock<HashMap<String, NotificationPreference>>,
}

impl PreferenceStore {
    /// Creates a new, empty preference store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the user's preference record, creating the default record on
    /// first access.
    pub async fn get_or_default(&self, user_id: &str) -> NotificationPreference {
        let mut prefs = self.prefs.write().await;
        *prefs.entry(user_id.to_string()).or_default()
    }

    /// Upserts the user's record, merging only the provided fields, and
    /// returns the result.
    pub async fn merge(&self, user_id: &str, patch: PreferencePatch) -> NotificationPreference {
        let mut prefs = self.prefs.write().await;
        let entry = prefs.entry(user_id.to_string()).or_default();
        entry.merge(patch);
        *entry
    }
}

/// Provisioned user accounts, looked up by handshake auth and the
/// notification dispatcher. Provisioning itself happens in the external
/// auth flows.
#[derive(Default)]
pub struct UserStore {
    users: RwLock<HashMap<String, User>>,
}

impl UserStore {
    /// Creates a new, empty user store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user record.
    pub async fn insert(&self, user: User) {
        let mut users = self.users.write().await;
        users.insert(user.id.clone(), user);
    }

    /// Returns the user with the given id, if provisioned.
    pub async fn get(&self, user_id: &str) -> Option<User> {
        let users = self.users.read().await;
        users.get(user_id).cloned()
    }
}
