//! Shared server state: stores, gateway, session keys, and the mailer.
//!
//! One [`AppState`] is built at startup and passed by `Arc` into every
//! handler. The gateway rides inside it so broadcast-capable code always
//! holds an initialized registry (explicit dependency passing instead of a
//! process global).

use std::sync::Arc;

use crate::auth::{AuthError, SessionKey};
use crate::config::ServerConfig;
use crate::gateway::Gateway;
use crate::notify::{EmailSender, LogMailer};
use crate::store::{NotificationStore, PreferenceStore, TaskStore, UserStore};

/// Everything a request handler needs, shared across the process.
pub struct AppState {
    /// Key material for session tokens.
    pub session_key: SessionKey,
    /// Session token lifetime in seconds.
    pub session_ttl_secs: u64,
    /// Provisioned user accounts.
    pub users: UserStore,
    /// Tenant-scoped task records.
    pub tasks: TaskStore,
    /// Per-user notification log.
    pub notifications: NotificationStore,
    /// Per-user delivery preferences.
    pub preferences: PreferenceStore,
    /// Realtime connection registry.
    pub gateway: Gateway,
    /// Outbound email delivery.
    pub mailer: Arc<dyn EmailSender>,
}

impl AppState {
    /// Builds fresh state from the resolved configuration, wiring the
    /// logging mailer.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            session_key: SessionKey::derive(&config.session_secret),
            session_ttl_secs: config.session_ttl_secs,
            users: UserStore::new(),
            tasks: TaskStore::new(),
            notifications: NotificationStore::new(),
            preferences: PreferenceStore::new(),
            gateway: Gateway::new(),
            mailer: Arc::new(LogMailer),
        }
    }

    /// Replaces the mailer, for embedding and tests.
    #[must_use]
    pub fn with_mailer(mut self, mailer: Arc<dyn EmailSender>) -> Self {
        self.mailer = mailer;
        self
    }

    /// Issues a session token for a user with the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the claims cannot be encoded.
    pub fn issue_session(&self, user_id: &str) -> Result<String, AuthError> {
        self.session_key.issue(user_id, self.session_ttl_secs)
    }
}
