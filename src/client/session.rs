use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{AuthResponse, UserView};

pub const DEFAULT_EXPIRY_CHECK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSession {
    pub token: String,
    pub user: UserView,
    pub expires_at: NaiveDateTime,
}

impl ClientSession {
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        now >= self.expires_at
    }
}

impl From<AuthResponse> for ClientSession {
    fn from(res: AuthResponse) -> Self {
        Self {
            token: res.token,
            user: res.user,
            expires_at: res.expires_at,
        }
    }
}

/// Who is signed in. Every transition returns a new value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    session: Option<ClientSession>,
}

impl AuthState {
    pub fn login(session: ClientSession) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn logout() -> Self {
        Self::default()
    }

    pub fn expire_if_due(self, now: NaiveDateTime) -> Self {
        match &self.session {
            Some(session) if session.is_expired(now) => Self::logout(),
            _ => self,
        }
    }

    pub fn is_authenticated(&self, now: NaiveDateTime) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.token.is_empty() && !s.is_expired(now))
    }

    pub fn session(&self) -> Option<&ClientSession> {
        self.session.as_ref()
    }

    pub fn user(&self) -> Option<&UserView> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.token.as_str())
    }
}

/// Shared sign-in state for one client. Observers subscribe to changes.
pub struct SessionContext {
    tx: watch::Sender<AuthState>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthState::default());
        Self { tx }
    }

    /// Rebuilds the context from a stored session. Unreadable or expired
    /// sessions are dropped.
    pub fn restore(stored: Option<&str>, now: NaiveDateTime) -> Self {
        let ctx = Self::new();
        let Some(raw) = stored else {
            return ctx;
        };

        match serde_json::from_str::<ClientSession>(raw) {
            Ok(session) if !session.is_expired(now) => ctx.login(session),
            Ok(_) => tracing::info!("stored session has expired; starting signed out"),
            Err(e) => tracing::warn!(error = %e, "discarding unreadable stored session"),
        }
        ctx
    }

    /// The current session serialized for storage, if any.
    pub fn to_storage(&self) -> Option<String> {
        self.tx
            .borrow()
            .session()
            .and_then(|s| serde_json::to_string(s).ok())
    }

    pub fn login(&self, session: ClientSession) {
        tracing::info!(user_id = %session.user.id, "signed in");
        self.tx.send_replace(AuthState::login(session));
    }

    pub fn logout(&self) {
        self.tx.send_if_modified(|state| {
            if state.session().is_none() {
                return false;
            }
            *state = AuthState::logout();
            true
        });
    }

    pub fn current(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    pub fn is_authenticated(&self, now: NaiveDateTime) -> bool {
        self.tx.borrow().is_authenticated(now)
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    /// Signs out when the session has expired at `now`. Returns whether it did.
    pub fn check_expiry(&self, now: NaiveDateTime) -> bool {
        self.tx.send_if_modified(|state| {
            let had_session = state.session().is_some();
            let next = std::mem::take(state).expire_if_due(now);
            let expired = had_session && next.session().is_none();
            *state = next;
            expired
        })
    }

    /// Checks for expiry every `period` until the returned watcher is dropped.
    pub fn spawn_expiry_watcher(self: &Arc<Self>, period: Duration) -> ExpiryWatcher {
        let ctx = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if ctx.check_expiry(Utc::now().naive_utc()) {
                    tracing::info!("session expired; signed out");
                }
            }
        });
        ExpiryWatcher { handle }
    }
}

/// Aborts the expiry check when dropped.
pub struct ExpiryWatcher {
    handle: JoinHandle<()>,
}

impl Drop for ExpiryWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
